//! The capability every protocol bridge implements.

use async_trait::async_trait;
use hearth_protocol::ChangeEvent;
use thiserror::Error;

/// Failure reported by an integration callback.
///
/// The bus logs these per integration; they never reach the commit path or
/// other integrations.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Could not reach the external system.
    #[error("connection error: {0}")]
    Connection(String),

    /// Could not deliver a message.
    #[error("publish error: {0}")]
    Publish(String),

    /// Misconfigured integration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A bridge between the object store and an external protocol.
///
/// Implementations receive every committed change for the devices they
/// handle, except changes they wrote themselves (matched on
/// `integration:<name>` in the event source).
///
/// # Example
///
/// ```rust,ignore
/// struct LogIntegration;
///
/// #[async_trait]
/// impl Integration for LogIntegration {
///     fn name(&self) -> &str { "log" }
///     async fn initialize(&self) -> Result<(), IntegrationError> { Ok(()) }
///     async fn shutdown(&self) -> Result<(), IntegrationError> { Ok(()) }
///     async fn on_device_state_change(&self, event: &ChangeEvent) -> Result<(), IntegrationError> {
///         println!("{} r{}", event.key, event.revision);
///         Ok(())
///     }
///     async fn on_device_connected(&self, _serial: &str) -> Result<(), IntegrationError> { Ok(()) }
///     async fn on_device_disconnected(&self, _serial: &str) -> Result<(), IntegrationError> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait Integration: Send + Sync {
    /// Unique name; also the suffix of this integration's source tag.
    fn name(&self) -> &str;

    /// Returns true if events for `serial` belong to this integration's
    /// account scope.
    fn handles_device(&self, _serial: &str) -> bool {
        true
    }

    /// Called once before the integration receives any event.
    async fn initialize(&self) -> Result<(), IntegrationError>;

    /// Called once after the integration stops receiving events.
    async fn shutdown(&self) -> Result<(), IntegrationError>;

    /// A committed change.
    async fn on_device_state_change(&self, event: &ChangeEvent) -> Result<(), IntegrationError>;

    /// A device came online. May be repeated; implementations must be
    /// idempotent.
    async fn on_device_connected(&self, serial: &str) -> Result<(), IntegrationError>;

    /// A device went offline. May be repeated; implementations must be
    /// idempotent.
    async fn on_device_disconnected(&self, serial: &str) -> Result<(), IntegrationError>;
}
