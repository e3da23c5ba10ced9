//! Error types for the sync server.

use crate::integration::IntegrationError;
use hearth_core::CoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// Timeouts are not errors: an idle poll resolves as
/// [`PollOutcome::TimedOut`](crate::PollOutcome::TimedOut).
#[derive(Error, Debug)]
pub enum ServerError {
    /// The backing store could not load or persist. The write did not
    /// happen and the device should retry.
    #[error(transparent)]
    StorageUnavailable(#[from] CoreError),

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An integration failed to initialize.
    #[error("integration {name} failed: {source}")]
    IntegrationFailure {
        /// Integration name.
        name: String,
        /// Underlying failure.
        #[source]
        source: IntegrationError,
    },

    /// The server is shutting down.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidRequest(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::StorageUnavailable(_)
                | ServerError::IntegrationFailure { .. }
                | ServerError::ShuttingDown
        )
    }
}
