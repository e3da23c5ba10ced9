//! Fan-out of committed changes and presence transitions to integrations.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::integration::{Integration, IntegrationError};
use crate::presence::{PresenceChange, PresenceTracker};
use hearth_core::ObjectStore;
use hearth_protocol::ChangeEvent;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work queued for one integration.
enum Delivery {
    State(Arc<ChangeEvent>),
    Connected(String),
    Disconnected(String),
}

struct Registered {
    integration: Arc<dyn Integration>,
    queue: mpsc::UnboundedSender<Delivery>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct BusInner {
    registry: RwLock<HashMap<String, Registered>>,
}

impl BusInner {
    fn dispatch_change(&self, event: ChangeEvent) {
        let event = Arc::new(event);
        let registry = self.registry.read();
        for (name, registered) in registry.iter() {
            if event.source.is_integration(name) {
                continue;
            }
            if let Some(serial) = &event.serial {
                if !registered.integration.handles_device(serial) {
                    continue;
                }
            }
            if registered
                .queue
                .send(Delivery::State(Arc::clone(&event)))
                .is_err()
            {
                warn!(integration = %name, key = %event.key, "integration worker gone, dropping change");
            }
        }
    }

    fn dispatch_presence(&self, change: PresenceChange) {
        let registry = self.registry.read();
        for (name, registered) in registry.iter() {
            if !registered.integration.handles_device(change.serial()) {
                continue;
            }
            let delivery = match &change {
                PresenceChange::Connected(serial) => Delivery::Connected(serial.clone()),
                PresenceChange::Disconnected(serial) => Delivery::Disconnected(serial.clone()),
            };
            if registered.queue.send(delivery).is_err() {
                warn!(integration = %name, serial = %change.serial(), "integration worker gone, dropping presence change");
            }
        }
    }
}

/// Delivers committed changes and device connectivity to registered
/// integrations.
///
/// Each integration has its own queue and worker task. A slow or failing
/// integration delays only itself; the commit that produced an event has
/// already returned by the time the event is dispatched. An event written
/// by `integration:<name>` is never delivered back to `<name>`.
pub struct IntegrationBus {
    inner: Arc<BusInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IntegrationBus {
    /// Starts the dispatcher and the presence sweeper.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(
        store: &ObjectStore,
        presence: Arc<PresenceTracker>,
        presence_rx: mpsc::UnboundedReceiver<PresenceChange>,
        config: &ServerConfig,
    ) -> Self {
        let inner = Arc::new(BusInner::default());
        let changes = store.subscribe();

        let dispatcher = tokio::spawn(run_dispatcher(Arc::downgrade(&inner), changes, presence_rx));
        let sweeper = tokio::spawn(run_sweeper(presence, config.presence_sweep_interval));

        Self {
            inner,
            tasks: Mutex::new(vec![dispatcher, sweeper]),
        }
    }

    /// Initializes and registers an integration.
    ///
    /// Returns `Ok(false)` if an integration with the same name is already
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::IntegrationFailure`] if `initialize` fails;
    /// nothing is registered in that case.
    pub async fn register(&self, integration: Arc<dyn Integration>) -> ServerResult<bool> {
        let name = integration.name().to_string();
        if self.inner.registry.read().contains_key(&name) {
            debug!(integration = %name, "already registered");
            return Ok(false);
        }

        integration
            .initialize()
            .await
            .map_err(|source| ServerError::IntegrationFailure {
                name: name.clone(),
                source,
            })?;

        let (queue, rx) = mpsc::unbounded_channel();
        let raced = {
            let mut registry = self.inner.registry.write();
            if registry.contains_key(&name) {
                true
            } else {
                let worker = tokio::spawn(run_worker(Arc::clone(&integration), rx));
                registry.insert(
                    name.clone(),
                    Registered {
                        integration: Arc::clone(&integration),
                        queue,
                        worker,
                    },
                );
                false
            }
        };

        if raced {
            // A concurrent register of the same name won.
            if let Err(error) = integration.shutdown().await {
                warn!(integration = %name, %error, "shutdown after lost registration failed");
            }
            return Ok(false);
        }

        info!(integration = %name, "integration registered");
        Ok(true)
    }

    /// Unregisters an integration, drains its queue and shuts it down.
    ///
    /// Returns `Ok(false)` if no integration has that name. A failing
    /// `shutdown` is logged; the integration is unregistered regardless.
    pub async fn unregister(&self, name: &str) -> ServerResult<bool> {
        let removed = self.inner.registry.write().remove(name);
        let Some(registered) = removed else {
            return Ok(false);
        };

        let Registered {
            integration,
            queue,
            worker,
        } = registered;
        drop(queue);
        if let Err(error) = worker.await {
            warn!(integration = %name, %error, "integration worker ended abnormally");
        }
        if let Err(error) = integration.shutdown().await {
            warn!(integration = %name, %error, "integration shutdown failed");
        }

        info!(integration = %name, "integration unregistered");
        Ok(true)
    }

    /// Names of registered integrations, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.registry.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stops dispatching and unregisters every integration.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for name in self.registered_names() {
            let _ = self.unregister(&name).await;
        }
    }
}

impl Drop for IntegrationBus {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn run_dispatcher(
    inner: Weak<BusInner>,
    mut changes: mpsc::UnboundedReceiver<ChangeEvent>,
    mut presence: mpsc::UnboundedReceiver<PresenceChange>,
) {
    let mut presence_open = true;
    loop {
        tokio::select! {
            event = changes.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                inner.dispatch_change(event);
            }
            change = presence.recv(), if presence_open => {
                match change {
                    Some(change) => {
                        let Some(inner) = inner.upgrade() else { break };
                        inner.dispatch_presence(change);
                    }
                    None => presence_open = false,
                }
            }
        }
    }
    debug!("bus dispatcher stopped");
}

async fn run_sweeper(presence: Arc<PresenceTracker>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        presence.sweep(Instant::now());
    }
}

async fn run_worker(integration: Arc<dyn Integration>, mut queue: mpsc::UnboundedReceiver<Delivery>) {
    let name = integration.name().to_string();
    while let Some(delivery) = queue.recv().await {
        // Each callback runs in its own task so a panic is contained to
        // that delivery; awaiting it keeps deliveries in order.
        let callback = tokio::spawn(deliver(Arc::clone(&integration), delivery));
        match callback.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(integration = %name, %error, "integration callback failed");
            }
            Err(error) if error.is_panic() => {
                warn!(integration = %name, "integration callback panicked");
            }
            Err(error) => {
                warn!(integration = %name, %error, "integration callback cancelled");
                break;
            }
        }
    }
    debug!(integration = %name, "integration worker drained");
}

async fn deliver(
    integration: Arc<dyn Integration>,
    delivery: Delivery,
) -> Result<(), IntegrationError> {
    match &delivery {
        Delivery::State(event) => integration.on_device_state_change(event).await,
        Delivery::Connected(serial) => integration.on_device_connected(serial).await,
        Delivery::Disconnected(serial) => integration.on_device_disconnected(serial).await,
    }
}
