//! Error types for the MQTT bridge.

use hearth_core::CoreError;
use hearth_server::IntegrationError;
use thiserror::Error;

/// Result type for bridge operations.
pub type MqttResult<T> = Result<T, MqttError>;

/// Errors that can occur in the MQTT bridge.
#[derive(Debug, Error)]
pub enum MqttError {
    /// The rumqttc client rejected a request.
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Invalid bridge configuration.
    #[error("invalid mqtt configuration: {0}")]
    Config(String),

    /// The bridge is not initialized.
    #[error("mqtt bridge is not connected")]
    NotConnected,

    /// An inbound command could not be understood. Logged and dropped.
    #[error("malformed command on {topic}: {reason}")]
    MalformedCommand {
        /// Topic the command arrived on.
        topic: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Failed to encode an outbound payload.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the command's write.
    #[error(transparent)]
    Store(#[from] CoreError),
}

impl MqttError {
    pub(crate) fn malformed(topic: &str, reason: impl Into<String>) -> Self {
        MqttError::MalformedCommand {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<MqttError> for IntegrationError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::Config(msg) => IntegrationError::Config(msg),
            MqttError::Client(_) | MqttError::NotConnected => {
                IntegrationError::Connection(err.to_string())
            }
            other => IntegrationError::Publish(other.to_string()),
        }
    }
}
