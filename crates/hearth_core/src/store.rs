//! The authoritative object store.

use crate::change_feed::{ChangeFeed, ChangeReceiver};
use crate::error::{CoreError, CoreResult};
use crate::merge::{ClampEvent, MergeRules};
use hearth_protocol::{ChangeEvent, ObjectKey, ObjectValue, Source, StoredObject};
use hearth_storage::ObjectBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Outcome of [`ObjectStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    /// The object after the commit (unchanged on a no-op).
    pub object: StoredObject,
    /// False if the merge produced the existing value.
    pub changed: bool,
    /// Setpoints that were clamped.
    pub clamps: Vec<ClampEvent>,
    /// True if an active fan timer was restored.
    pub fan_timer_restored: bool,
}

/// Cache of `{key -> object}` in front of an [`ObjectBackend`].
///
/// Reads are served from memory after the first load of a key. Every
/// commit runs merge, persist, cache update and event emission inside that
/// key's critical section, so:
/// - two writers on the same key never share a merge base
/// - subscribers see each key's revisions in order with no gaps
/// - a slow persist on one key never blocks another key
///
/// # Example
///
/// ```rust,ignore
/// let store = ObjectStore::new(Arc::new(InMemoryBackend::new()), MergeRules::default());
/// let key = ObjectKey::parse("shared.ABC123")?;
/// let result = store.commit(&key, partial, Source::Dashboard).await?;
/// assert_eq!(result.object.revision, 1);
/// ```
pub struct ObjectStore {
    backend: Arc<dyn ObjectBackend>,
    rules: MergeRules,
    /// Loaded keys. `None` records a key known to be absent from the backend.
    /// Entries are never evicted, so this grows with the set of distinct keys
    /// ever read or written.
    cache: RwLock<HashMap<ObjectKey, Option<StoredObject>>>,
    /// Per-key critical sections. An entry lives only while some task holds
    /// or waits for it.
    locks: LockArena,
    feed: ChangeFeed,
}

impl ObjectStore {
    /// Creates a store over `backend`.
    pub fn new(backend: Arc<dyn ObjectBackend>, rules: MergeRules) -> Self {
        Self {
            backend,
            rules,
            cache: RwLock::new(HashMap::new()),
            locks: LockArena::default(),
            feed: ChangeFeed::new(),
        }
    }

    /// Returns the merge rules in force.
    pub fn rules(&self) -> &MergeRules {
        &self.rules
    }

    /// Subscribes to committed changes.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.feed.subscribe()
    }

    /// Number of keys held in memory, including known-absent ones.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns the current object for `key`.
    ///
    /// Served from memory; the first access of a key loads it from the
    /// backend once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if the first load fails.
    pub async fn get(&self, key: &ObjectKey) -> CoreResult<Option<StoredObject>> {
        let cached = self.cache.read().get(key).cloned();
        if let Some(entry) = cached {
            return Ok(entry);
        }

        let _guard = self.locks.lock(key).await;
        self.load_locked(key).await
    }

    /// Returns the existing objects among `keys`, in order.
    ///
    /// # Errors
    ///
    /// Returns the first load failure.
    pub async fn snapshot(&self, keys: &[ObjectKey]) -> CoreResult<Vec<StoredObject>> {
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(object) = self.get(key).await? {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    /// Merges `partial` into `key` and commits the result.
    ///
    /// If the merged value equals the existing value nothing is written and
    /// `changed` is false. Otherwise the value is persisted, the revision is
    /// bumped by one and exactly one change event is emitted before
    /// returning. A write to an absent key always creates revision 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StorageUnavailable`] if the load or persist
    /// fails; the cache is left untouched and no event is emitted.
    pub async fn commit(
        &self,
        key: &ObjectKey,
        partial: ObjectValue,
        source: Source,
    ) -> CoreResult<CommitResult> {
        let _guard = self.locks.lock(key).await;

        let existing = self.load_locked(key).await?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let empty = ObjectValue::new();
        let base = existing.as_ref().map(|o| &o.value).unwrap_or(&empty);
        let outcome = self
            .rules
            .merge(key.object_type(), base, &partial, now.as_secs_f64());

        for clamp in &outcome.clamps {
            warn!(
                %key,
                %source,
                field = %clamp.field,
                requested = clamp.requested,
                applied = clamp.applied,
                "setpoint clamped into safety range"
            );
        }
        if outcome.fan_timer_restored {
            debug!(%key, %source, "active fan timer restored");
        }

        if let Some(current) = &existing {
            if outcome.value == current.value {
                debug!(%key, %source, revision = current.revision, "no-op write");
                return Ok(CommitResult {
                    object: current.clone(),
                    changed: false,
                    clamps: outcome.clamps,
                    fan_timer_restored: outcome.fan_timer_restored,
                });
            }
        }

        let (revision, timestamp) = match &existing {
            Some(current) => (
                current.revision + 1,
                (now.as_millis() as u64).max(current.timestamp),
            ),
            None => (1, now.as_millis() as u64),
        };
        let object = StoredObject::new(key.clone(), outcome.value, revision, timestamp);

        if let Err(source_err) = self.backend.persist(&object).await {
            warn!(%key, %source, error = %source_err, "persist failed, write dropped");
            return Err(CoreError::StorageUnavailable {
                key: key.clone(),
                source: source_err,
            });
        }

        self.cache.write().insert(key.clone(), Some(object.clone()));
        self.feed.emit(ChangeEvent::committed(&object, source.clone()));
        debug!(%key, %source, revision, "committed");

        Ok(CommitResult {
            object,
            changed: true,
            clamps: outcome.clamps,
            fan_timer_restored: outcome.fan_timer_restored,
        })
    }

    /// Must be called with the key's lock held.
    async fn load_locked(&self, key: &ObjectKey) -> CoreResult<Option<StoredObject>> {
        let cached = self.cache.read().get(key).cloned();
        if let Some(entry) = cached {
            return Ok(entry);
        }

        let loaded = self
            .backend
            .load(key)
            .await
            .map_err(|source| CoreError::StorageUnavailable {
                key: key.clone(),
                source,
            })?;
        debug!(%key, found = loaded.is_some(), "loaded from backend");
        self.cache.write().insert(key.clone(), loaded.clone());
        Ok(loaded)
    }
}

type KeyMutex = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct LockArena {
    entries: Mutex<HashMap<ObjectKey, KeyMutex>>,
}

impl LockArena {
    async fn lock(&self, key: &ObjectKey) -> KeyGuard<'_> {
        let mutex = Arc::clone(self.entries.lock().entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        KeyGuard {
            arena: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Holds a key's critical section; drops the arena entry once unused.
struct KeyGuard<'a> {
    arena: &'a LockArena,
    key: ObjectKey,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut entries = self.arena.entries.lock();
        // Clones are only taken under this lock, so a count of one means no
        // task holds or waits for the mutex.
        if entries
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            entries.remove(&self.key);
        }
    }
}
