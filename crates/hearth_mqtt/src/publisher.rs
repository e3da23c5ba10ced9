//! Outbound side of the broker connection.

use crate::error::MqttResult;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

/// What the bridge needs from an MQTT client.
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> MqttResult<()>;

    /// Subscribes to a topic filter.
    async fn subscribe(&self, filter: &str) -> MqttResult<()>;

    /// Closes the connection.
    async fn disconnect(&self) -> MqttResult<()> {
        Ok(())
    }
}

/// [`MqttPublisher`] over a rumqttc client.
#[derive(Clone)]
pub struct RumqttcPublisher {
    client: AsyncClient,
    qos: QoS,
}

impl RumqttcPublisher {
    /// Wraps a client; every request uses `qos`.
    pub fn new(client: AsyncClient, qos: QoS) -> Self {
        Self { client, qos }
    }
}

#[async_trait]
impl MqttPublisher for RumqttcPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> MqttResult<()> {
        self.client.publish(topic, self.qos, retain, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> MqttResult<()> {
        self.client.subscribe(filter, self.qos).await?;
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}
