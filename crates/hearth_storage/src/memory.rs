//! In-memory storage backend for testing.

use crate::backend::ObjectBackend;
use crate::error::StorageResult;
use async_trait::async_trait;
use hearth_protocol::{ObjectKey, StoredObject};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory storage backend.
///
/// This backend stores all records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Deployments that seed state on start and don't need persistence
///
/// # Example
///
/// ```rust
/// use hearth_protocol::{ObjectKey, ObjectValue, StoredObject};
/// use hearth_storage::InMemoryBackend;
///
/// let key = ObjectKey::parse("device.ABC123").unwrap();
/// let backend = InMemoryBackend::with_objects(vec![
///     StoredObject::new(key.clone(), ObjectValue::new(), 3, 0),
/// ]);
/// assert_eq!(backend.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: RwLock<HashMap<ObjectKey, StoredObject>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding pre-existing records.
    #[must_use]
    pub fn with_objects(objects: impl IntoIterator<Item = StoredObject>) -> Self {
        let objects = objects
            .into_iter()
            .map(|object| (object.key.clone(), object))
            .collect();
        Self {
            objects: RwLock::new(objects),
        }
    }

    /// Returns a copy of the stored record for `key`.
    #[must_use]
    pub fn record(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn load(&self, key: &ObjectKey) -> StorageResult<Option<StoredObject>> {
        Ok(self.record(key))
    }

    async fn persist(&self, object: &StoredObject) -> StorageResult<()> {
        self.objects
            .write()
            .insert(object.key.clone(), object.clone());
        Ok(())
    }
}
