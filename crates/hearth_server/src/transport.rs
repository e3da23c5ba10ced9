//! Long-poll transport channel.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::presence::PresenceTracker;
use hearth_core::ObjectStore;
use hearth_protocol::{
    ChangeEvent, ObjectKey, PollRequest, PollResponse, PutRequest, PutResponse, Source,
    StoredObject,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Objects newer than the device's revisions.
    Results(BTreeMap<ObjectKey, StoredObject>),
    /// Nothing changed before the deadline. The device should poll again.
    TimedOut,
    /// The wait was cancelled before resolution. Nothing is sent.
    Cancelled,
}

impl PollOutcome {
    /// Converts into the response sent to the device, if any.
    pub fn into_response(self) -> Option<PollResponse> {
        match self {
            PollOutcome::Results(results) => Some(PollResponse::results(results)),
            PollOutcome::TimedOut => Some(PollResponse::timed_out()),
            PollOutcome::Cancelled => None,
        }
    }

    /// Returns true if the poll idled out.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut)
    }
}

enum WaitResolution {
    Data(BTreeMap<ObjectKey, StoredObject>),
    Cancelled,
}

impl From<WaitResolution> for PollOutcome {
    fn from(resolution: WaitResolution) -> Self {
        match resolution {
            WaitResolution::Data(results) => PollOutcome::Results(results),
            WaitResolution::Cancelled => PollOutcome::Cancelled,
        }
    }
}

/// A parked poll.
struct PendingWait {
    serial: String,
    /// Watched keys with the revision the device already has.
    since: HashMap<ObjectKey, u64>,
    tx: oneshot::Sender<WaitResolution>,
}

impl PendingWait {
    fn matches(&self, event: &ChangeEvent) -> bool {
        self.since
            .get(&event.key)
            .is_some_and(|since| event.revision > *since)
    }
}

struct ChannelInner {
    store: Arc<ObjectStore>,
    presence: Arc<PresenceTracker>,
    config: ServerConfig,
    waits: Mutex<HashMap<u64, PendingWait>>,
    next_id: AtomicU64,
}

impl ChannelInner {
    fn register(&self, wait: PendingWait) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waits.lock().insert(id, wait);
        id
    }

    fn remove(&self, id: u64) -> Option<PendingWait> {
        self.waits.lock().remove(&id)
    }

    /// Removes every wait matching `select` and resolves it while the
    /// registry lock is held, so a failed [`remove`](Self::remove) always
    /// finds the resolution already queued.
    fn resolve_where(
        &self,
        select: impl Fn(&PendingWait) -> bool,
        resolution: impl Fn() -> WaitResolution,
    ) -> usize {
        let mut waits = self.waits.lock();
        let ids: Vec<u64> = waits
            .iter()
            .filter(|(_, wait)| select(wait))
            .map(|(id, _)| *id)
            .collect();

        let mut resolved = 0;
        for id in ids {
            if let Some(wait) = waits.remove(&id) {
                if wait.tx.send(resolution()).is_ok() {
                    resolved += 1;
                }
            }
        }
        resolved
    }

    fn deliver(&self, event: &ChangeEvent) {
        let resolved = self.resolve_where(
            |wait| wait.matches(event),
            || {
                let mut results = BTreeMap::new();
                results.insert(event.key.clone(), event.to_object());
                WaitResolution::Data(results)
            },
        );
        if resolved > 0 {
            debug!(key = %event.key, revision = event.revision, resolved, "parked polls resolved");
        }
    }
}

/// Removes the wait when the poll ends, including when its future is
/// dropped because the connection closed.
struct WaitGuard<'a> {
    inner: &'a ChannelInner,
    id: u64,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.inner.remove(self.id).is_some() {
            trace!(wait = self.id, "wait released");
        }
    }
}

struct PresenceGuard<'a> {
    presence: &'a PresenceTracker,
    serial: &'a str,
}

impl Drop for PresenceGuard<'_> {
    fn drop(&mut self) {
        self.presence.poll_finished(self.serial);
    }
}

/// Device-facing long-poll channel.
///
/// A poll either answers at once with anything newer than the device's
/// revisions, or parks until a matching commit, its timeout, or
/// cancellation. Every parked wait is resolved at most once.
///
/// # Example
///
/// ```rust,ignore
/// let channel = TransportChannel::start(store, presence, ServerConfig::default());
/// let request = PollRequest::new("ABC123", vec![ObjectKey::device("ABC123")?])
///     .with_since(ObjectKey::device("ABC123")?, 5);
/// match channel.poll(request).await? {
///     PollOutcome::Results(objects) => { /* send to device */ }
///     PollOutcome::TimedOut => { /* empty response, device re-polls */ }
///     PollOutcome::Cancelled => {}
/// }
/// ```
pub struct TransportChannel {
    inner: Arc<ChannelInner>,
    notifier: JoinHandle<()>,
}

impl TransportChannel {
    /// Creates the channel and starts listening for commits.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        store: Arc<ObjectStore>,
        presence: Arc<PresenceTracker>,
        config: ServerConfig,
    ) -> Self {
        let mut changes = store.subscribe();
        let inner = Arc::new(ChannelInner {
            store,
            presence,
            config,
            waits: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });

        let weak: Weak<ChannelInner> = Arc::downgrade(&inner);
        let notifier = tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.deliver(&event);
            }
        });

        Self { inner, notifier }
    }

    /// Serves a device poll.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::StorageUnavailable`](crate::ServerError::StorageUnavailable)
    /// if a watched key cannot be loaded.
    pub async fn poll(&self, request: PollRequest) -> ServerResult<PollOutcome> {
        let inner = &*self.inner;
        let timeout = inner.config.poll_timeout(request.timeout_ms);

        inner.presence.poll_started(&request.serial);
        let _presence = PresenceGuard {
            presence: &inner.presence,
            serial: &request.serial,
        };

        let since: HashMap<ObjectKey, u64> = request
            .keys
            .iter()
            .map(|key| (key.clone(), request.since_for(key)))
            .collect();

        // Registered before the store check so a commit landing in between
        // resolves the wait instead of being missed.
        let (tx, mut rx) = oneshot::channel();
        let id = inner.register(PendingWait {
            serial: request.serial.clone(),
            since: since.clone(),
            tx,
        });
        let _wait = WaitGuard { inner, id };

        let mut ready = BTreeMap::new();
        for key in &request.keys {
            if let Some(object) = inner.store.get(key).await? {
                if object.is_newer_than(since.get(key).copied().unwrap_or(0)) {
                    ready.insert(key.clone(), object);
                }
            }
        }

        if !ready.is_empty() {
            if inner.remove(id).is_some() {
                debug!(serial = %request.serial, count = ready.len(), "poll answered immediately");
                return Ok(PollOutcome::Results(ready));
            }
            return Ok(Self::already_resolved(&mut rx));
        }

        trace!(serial = %request.serial, wait = id, ?timeout, "poll parked");
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(resolution)) => Ok(resolution.into()),
            Ok(Err(_)) => Ok(PollOutcome::Cancelled),
            Err(_) => {
                if inner.remove(id).is_some() {
                    debug!(serial = %request.serial, "poll timed out");
                    Ok(PollOutcome::TimedOut)
                } else {
                    Ok(Self::already_resolved(&mut rx))
                }
            }
        }
    }

    /// Applies a device write.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::StorageUnavailable`](crate::ServerError::StorageUnavailable)
    /// if the write could not be persisted; the device should retry.
    pub async fn put(&self, request: PutRequest) -> ServerResult<PutResponse> {
        self.inner.presence.touch(&request.serial);
        let result = self
            .inner
            .store
            .commit(&request.key, request.value, Source::Device)
            .await?;
        Ok(PutResponse {
            revision: result.object.revision,
            timestamp: result.object.timestamp,
        })
    }

    /// Resolves every parked wait of `serial` with `objects`, regardless of
    /// the keys they watch.
    ///
    /// Returns the number of waits resolved.
    pub fn push(&self, serial: &str, objects: Vec<StoredObject>) -> usize {
        if objects.is_empty() {
            return 0;
        }
        let results: BTreeMap<ObjectKey, StoredObject> = objects
            .into_iter()
            .map(|object| (object.key.clone(), object))
            .collect();
        let resolved = self.inner.resolve_where(
            |wait| wait.serial == serial,
            || WaitResolution::Data(results.clone()),
        );
        debug!(serial = %serial, resolved, "objects pushed");
        resolved
    }

    /// Cancels every parked wait of `serial`.
    ///
    /// Returns the number of waits cancelled.
    pub fn cancel(&self, serial: &str) -> usize {
        let cancelled = self
            .inner
            .resolve_where(|wait| wait.serial == serial, || WaitResolution::Cancelled);
        debug!(serial = %serial, cancelled, "waits cancelled");
        cancelled
    }

    /// Cancels every parked wait.
    pub fn cancel_all(&self) -> usize {
        self.inner.resolve_where(|_| true, || WaitResolution::Cancelled)
    }

    /// Number of parked waits.
    pub fn waiting_count(&self) -> usize {
        self.inner.waits.lock().len()
    }

    /// Returns true if `serial` has a parked wait.
    pub fn is_waiting(&self, serial: &str) -> bool {
        self.inner
            .waits
            .lock()
            .values()
            .any(|wait| wait.serial == serial)
    }

    /// Another path removed the wait; its resolution was sent under the
    /// registry lock and is already in the channel.
    fn already_resolved(rx: &mut oneshot::Receiver<WaitResolution>) -> PollOutcome {
        rx.try_recv()
            .map(PollOutcome::from)
            .unwrap_or(PollOutcome::Cancelled)
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.notifier.abort();
    }
}
