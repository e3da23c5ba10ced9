//! The composition root.

use crate::bus::IntegrationBus;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::integration::Integration;
use crate::presence::PresenceTracker;
use crate::transport::{PollOutcome, TransportChannel};
use hearth_core::{CommitResult, ObjectStore};
use hearth_protocol::{
    ClaimRequest, ObjectKey, ObjectValue, PollRequest, PutRequest, PutResponse, Source,
    StoredObject,
};
use hearth_storage::ObjectBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// One object store with its transport channel and integration bus.
///
/// This is the single owner of the store; the HTTP layer and integrations
/// reach it only through this handle.
///
/// # Example
///
/// ```rust,ignore
/// let server = SyncServer::start(Arc::new(InMemoryBackend::new()), ServerConfig::default());
/// server.register_integration(Arc::new(mqtt)).await?;
///
/// let response = server.put(PutRequest { serial, key, value }).await?;
/// let outcome = server.poll(request).await?;
///
/// server.shutdown().await;
/// ```
pub struct SyncServer {
    store: Arc<ObjectStore>,
    presence: Arc<PresenceTracker>,
    transport: TransportChannel,
    bus: IntegrationBus,
    config: ServerConfig,
    shutting_down: AtomicBool,
}

impl SyncServer {
    /// Wires a server around `backend`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(backend: Arc<dyn ObjectBackend>, config: ServerConfig) -> Self {
        let store = Arc::new(ObjectStore::new(backend, config.merge_rules.clone()));
        let (presence, presence_rx) = PresenceTracker::new(config.liveness_window);
        let presence = Arc::new(presence);

        let transport = TransportChannel::start(store.clone(), presence.clone(), config.clone());
        let bus = IntegrationBus::start(&store, presence.clone(), presence_rx, &config);

        info!(
            liveness_window = ?config.liveness_window,
            default_poll_timeout = ?config.default_poll_timeout,
            "sync server started"
        );

        Self {
            store,
            presence,
            transport,
            bus,
            config,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the object store.
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// Returns the presence tracker.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Returns the transport channel.
    pub fn transport(&self) -> &TransportChannel {
        &self.transport
    }

    /// Serves a device long-poll.
    pub async fn poll(&self, request: PollRequest) -> ServerResult<PollOutcome> {
        self.ensure_running()?;
        if request.serial.is_empty() {
            return Err(ServerError::InvalidRequest("empty serial".into()));
        }
        self.transport.poll(request).await
    }

    /// Applies a device write.
    pub async fn put(&self, request: PutRequest) -> ServerResult<PutResponse> {
        self.ensure_running()?;
        if request.serial.is_empty() {
            return Err(ServerError::InvalidRequest("empty serial".into()));
        }
        self.transport.put(request).await
    }

    /// Commits a write from a dashboard, API or integration.
    pub async fn commit(
        &self,
        key: &ObjectKey,
        partial: ObjectValue,
        source: Source,
    ) -> ServerResult<CommitResult> {
        self.ensure_running()?;
        Ok(self.store.commit(key, partial, source).await?)
    }

    /// Reads one object.
    pub async fn get(&self, key: &ObjectKey) -> ServerResult<Option<StoredObject>> {
        Ok(self.store.get(key).await?)
    }

    /// Pushes the current state of exactly the claimed keys to the device.
    ///
    /// Returns the number of parked polls resolved; zero if the device is
    /// not waiting or none of the keys exist.
    pub async fn claim(&self, request: ClaimRequest) -> ServerResult<usize> {
        self.ensure_running()?;
        let objects = self.store.snapshot(&request.object_keys).await?;
        let resolved = self.transport.push(&request.serial, objects);
        info!(serial = %request.serial, keys = request.object_keys.len(), resolved, "device claimed");
        Ok(resolved)
    }

    /// Registers an integration. Idempotent per name.
    pub async fn register_integration(
        &self,
        integration: Arc<dyn Integration>,
    ) -> ServerResult<bool> {
        self.ensure_running()?;
        self.bus.register(integration).await
    }

    /// Unregisters an integration by name. Idempotent.
    pub async fn unregister_integration(&self, name: &str) -> ServerResult<bool> {
        self.bus.unregister(name).await
    }

    /// Names of registered integrations.
    pub fn integrations(&self) -> Vec<String> {
        self.bus.registered_names()
    }

    /// Cancels parked polls and shuts every integration down.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self.transport.cancel_all();
        self.bus.shutdown().await;
        info!(cancelled, "sync server stopped");
    }

    fn ensure_running(&self) -> ServerResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            Err(ServerError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}
