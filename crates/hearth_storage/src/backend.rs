//! Persistence backend trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use hearth_protocol::{ObjectKey, StoredObject};

/// Durable home of committed objects.
///
/// The object store calls [`load`](ObjectBackend::load) once per key on first
/// access and [`persist`](ObjectBackend::persist) inside the key's critical
/// section on every committed change.
///
/// # Invariants
///
/// - `load` returns the record most recently passed to `persist` for that key
/// - `persist` either stores the whole record or fails; a failure leaves the
///   previous record in place
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For single-node persistent storage
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Loads the latest record for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`](crate::StorageError::Unavailable)
    /// or an I/O error if the record cannot be read.
    async fn load(&self, key: &ObjectKey) -> StorageResult<Option<StoredObject>>;

    /// Makes `object` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be stored. The caller must
    /// treat the write as not committed.
    async fn persist(&self, object: &StoredObject) -> StorageResult<()>;
}
