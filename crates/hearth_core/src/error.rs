//! Error types for hearth core.

use hearth_protocol::ObjectKey;
use hearth_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in object store operations.
///
/// Merges never fail; the only failure a caller sees is the backing store
/// being unreachable.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Loading or persisting an object failed. Nothing was committed.
    #[error("storage unavailable for {key}: {source}")]
    StorageUnavailable {
        /// Key being read or written.
        key: ObjectKey,
        /// Underlying backend error.
        #[source]
        source: StorageError,
    },
}

impl CoreError {
    /// Key the failed operation addressed.
    pub fn key(&self) -> &ObjectKey {
        match self {
            CoreError::StorageUnavailable { key, .. } => key,
        }
    }
}
