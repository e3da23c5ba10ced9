//! The MQTT integration.

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::payload::{encode_field, parse_payload};
use crate::publisher::{MqttPublisher, RumqttcPublisher};
use crate::topics::{Topics, AVAILABILITY_OFFLINE, AVAILABILITY_ONLINE};
use async_trait::async_trait;
use hearth_core::{CommitResult, ObjectStore};
use hearth_protocol::{ChangeEvent, ObjectValue, Source};
use hearth_server::{Integration, IntegrationError};
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, EventLoop, Packet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name under which the bridge registers; its writes carry
/// `integration:mqtt`.
pub const MQTT_INTEGRATION_NAME: &str = "mqtt";

/// An inbound publish.
struct Inbound {
    topic: String,
    payload: Vec<u8>,
}

struct BridgeInner {
    config: MqttConfig,
    topics: Topics,
    store: Arc<ObjectStore>,
    publisher: RwLock<Option<Arc<dyn MqttPublisher>>>,
}

impl BridgeInner {
    fn publisher(&self) -> MqttResult<Arc<dyn MqttPublisher>> {
        self.publisher.read().clone().ok_or(MqttError::NotConnected)
    }

    /// Subscribes to commands and announces the bridge. Runs after every
    /// (re)connect since subscriptions do not survive a clean session.
    async fn announce(&self) -> MqttResult<()> {
        let publisher = self.publisher()?;
        for filter in self.topics.command_subscriptions() {
            publisher.subscribe(&filter).await?;
            info!(topic = %filter, "subscribed to command topic");
        }
        if self.config.bridge_availability {
            publisher
                .publish(
                    &self.topics.bridge_availability_topic(),
                    AVAILABILITY_ONLINE.as_bytes().to_vec(),
                    true,
                )
                .await?;
        }
        Ok(())
    }

    async fn handle_command(&self, topic: &str, payload: &[u8]) -> MqttResult<Option<CommitResult>> {
        let Some(target) = self.topics.parse_command(topic) else {
            debug!(topic, "ignoring non-command topic");
            return Ok(None);
        };
        if !target.is_writable() {
            debug!(topic, object_type = %target.object_type, "command to read-only object type dropped");
            return Ok(None);
        }

        let value = parse_payload(topic, payload)?;
        let key = target
            .key()
            .map_err(|err| MqttError::malformed(topic, err.to_string()))?;
        let mut partial = ObjectValue::new();
        partial.insert(target.field.clone(), value);

        let result = self
            .store
            .commit(&key, partial, Source::integration(MQTT_INTEGRATION_NAME))
            .await?;
        debug!(
            %key,
            field = %target.field,
            revision = result.object.revision,
            changed = result.changed,
            "command applied"
        );
        Ok(Some(result))
    }

    async fn publish_state(&self, event: &ChangeEvent) -> MqttResult<()> {
        let Some(serial) = event.serial.as_deref() else {
            return Ok(());
        };
        let publisher = self.publisher()?;
        let retain = self.config.retain;

        let state_topic = self.topics.state_topic(serial, &event.object_type);
        publisher
            .publish(&state_topic, serde_json::to_vec(&event.value)?, retain)
            .await?;

        if self.config.publish_fields {
            for (field, value) in &event.value {
                let topic = self.topics.field_topic(serial, &event.object_type, field);
                publisher.publish(&topic, encode_field(value)?, retain).await?;
            }
        }
        debug!(key = %event.key, revision = event.revision, topic = %state_topic, "state published");
        Ok(())
    }

    async fn publish_availability(&self, serial: &str, payload: &str) -> MqttResult<()> {
        let publisher = self.publisher()?;
        publisher
            .publish(
                &self.topics.availability_topic(serial),
                payload.as_bytes().to_vec(),
                self.config.retain,
            )
            .await
    }
}

/// Bridges the object store to an MQTT broker.
///
/// Committed changes are published as whole objects and, optionally, per
/// field. Commands on `{prefix}/{serial}/{device|shared}/{field}/set` are
/// committed back to the store as `integration:mqtt`. Malformed commands
/// are logged and dropped.
///
/// # Example
///
/// ```rust,ignore
/// let server = SyncServer::start(backend, ServerConfig::default());
/// let mqtt = MqttIntegration::new(MqttConfig::new("broker.lan", 1883), server.store().clone());
/// server.register_integration(Arc::new(mqtt)).await?;
/// ```
pub struct MqttIntegration {
    inner: Arc<BridgeInner>,
    /// Used instead of a broker connection when set.
    preset: Option<Arc<dyn MqttPublisher>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MqttIntegration {
    /// Creates a bridge that connects to the configured broker on
    /// `initialize`.
    pub fn new(config: MqttConfig, store: Arc<ObjectStore>) -> Self {
        Self::build(config, store, None)
    }

    /// Creates a bridge over an existing publisher. Inbound commands are fed
    /// through [`handle_message`](Self::handle_message).
    pub fn with_publisher(
        config: MqttConfig,
        store: Arc<ObjectStore>,
        publisher: Arc<dyn MqttPublisher>,
    ) -> Self {
        Self::build(config, store, Some(publisher))
    }

    fn build(
        config: MqttConfig,
        store: Arc<ObjectStore>,
        preset: Option<Arc<dyn MqttPublisher>>,
    ) -> Self {
        let topics = config.topics();
        Self {
            inner: Arc::new(BridgeInner {
                config,
                topics,
                store,
                publisher: RwLock::new(None),
            }),
            preset,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The topic layout.
    pub fn topics(&self) -> &Topics {
        &self.inner.topics
    }

    /// Returns true while a publisher is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.publisher.read().is_some()
    }

    /// Applies one inbound message.
    ///
    /// Returns `Ok(None)` for topics that are not writable commands.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::MalformedCommand`] for a bad payload and
    /// [`MqttError::Store`] if the write could not be committed.
    pub async fn handle_message(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> MqttResult<Option<CommitResult>> {
        self.inner.handle_command(topic, payload).await
    }

    fn connect(&self) -> MqttResult<Arc<dyn MqttPublisher>> {
        let config = &self.inner.config;
        let options = config.mqtt_options()?;
        let (client, eventloop) = AsyncClient::new(options, 64);
        let publisher: Arc<dyn MqttPublisher> =
            Arc::new(RumqttcPublisher::new(client, config.qos_level()?));

        let (tx, rx) = mpsc::channel(256);
        let driver = tokio::spawn(drive_event_loop(eventloop, tx, Arc::clone(&self.inner)));
        let commands = tokio::spawn(run_commands(rx, Arc::clone(&self.inner)));
        self.tasks.lock().extend([driver, commands]);

        info!(host = %config.host, port = config.port, client_id = %config.client_id, "connecting to MQTT broker");
        Ok(publisher)
    }
}

#[async_trait]
impl Integration for MqttIntegration {
    fn name(&self) -> &str {
        MQTT_INTEGRATION_NAME
    }

    async fn initialize(&self) -> Result<(), IntegrationError> {
        match &self.preset {
            Some(publisher) => {
                *self.inner.publisher.write() = Some(Arc::clone(publisher));
                self.inner.announce().await?;
            }
            None => {
                let publisher = self.connect()?;
                // Subscriptions and the online announcement follow ConnAck.
                *self.inner.publisher.write() = Some(publisher);
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), IntegrationError> {
        let publisher = self.inner.publisher.write().take();
        if let Some(publisher) = publisher {
            if self.inner.config.bridge_availability {
                let topic = self.inner.topics.bridge_availability_topic();
                if let Err(error) = publisher
                    .publish(&topic, AVAILABILITY_OFFLINE.as_bytes().to_vec(), true)
                    .await
                {
                    warn!(%error, "failed to announce bridge offline");
                }
            }
            if let Err(error) = publisher.disconnect().await {
                warn!(%error, "MQTT disconnect failed");
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("MQTT integration stopped");
        Ok(())
    }

    async fn on_device_state_change(&self, event: &ChangeEvent) -> Result<(), IntegrationError> {
        Ok(self.inner.publish_state(event).await?)
    }

    async fn on_device_connected(&self, serial: &str) -> Result<(), IntegrationError> {
        Ok(self
            .inner
            .publish_availability(serial, AVAILABILITY_ONLINE)
            .await?)
    }

    async fn on_device_disconnected(&self, serial: &str) -> Result<(), IntegrationError> {
        Ok(self
            .inner
            .publish_availability(serial, AVAILABILITY_OFFLINE)
            .await?)
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Inbound>,
    inner: Arc<BridgeInner>,
) {
    let delay = inner.config.reconnect_delay();
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to MQTT broker");
                let inner = Arc::clone(&inner);
                // Requests go through the client queue this loop drains, so
                // they must not be awaited here.
                tokio::spawn(async move {
                    if let Err(error) = inner.announce().await {
                        warn!(%error, "failed to subscribe after connect");
                    }
                });
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let inbound = Inbound {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if tx.send(inbound).await.is_err() {
                    debug!("command receiver dropped, stopping event loop");
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, ?delay, "MQTT connection error, reconnecting");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn run_commands(mut rx: mpsc::Receiver<Inbound>, inner: Arc<BridgeInner>) {
    while let Some(inbound) = rx.recv().await {
        match inner.handle_command(&inbound.topic, &inbound.payload).await {
            Ok(_) => {}
            Err(error @ MqttError::MalformedCommand { .. }) => {
                warn!(%error, "dropping malformed command");
            }
            Err(error) => {
                warn!(topic = %inbound.topic, %error, "command failed");
            }
        }
    }
    debug!("command listener stopped");
}
