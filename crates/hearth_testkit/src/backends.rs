//! Storage backends that misbehave on demand.

use async_trait::async_trait;
use hearth_protocol::{ObjectKey, StoredObject};
use hearth_storage::{InMemoryBackend, ObjectBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

/// In-memory backend that can be switched offline.
///
/// While offline every load and persist fails with
/// [`StorageError::Unavailable`].
#[derive(Debug)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    available: AtomicBool,
    loads: AtomicUsize,
    persists: AtomicUsize,
}

impl FlakyBackend {
    /// Creates an online, empty backend.
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            available: AtomicBool::new(true),
            loads: AtomicUsize::new(0),
            persists: AtomicUsize::new(0),
        }
    }

    /// Switches the backend on or off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of load attempts, including failed ones.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of persist attempts, including failed ones.
    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    /// Returns the persisted record for a key.
    pub fn record(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.inner.record(key)
    }

    fn check(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("backend switched off".into()))
        }
    }
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectBackend for FlakyBackend {
    async fn load(&self, key: &ObjectKey) -> StorageResult<Option<StoredObject>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.load(key).await
    }

    async fn persist(&self, object: &StoredObject) -> StorageResult<()> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.persist(object).await
    }
}

/// In-memory backend whose persists of one key stall until released.
///
/// Used to hold a commit inside its critical section.
#[derive(Debug)]
pub struct GatedBackend {
    inner: InMemoryBackend,
    gated: ObjectKey,
    blocked: Notify,
    gate: Semaphore,
}

impl GatedBackend {
    /// Creates a backend that stalls persists of `gated`.
    pub fn new(gated: ObjectKey) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            gated,
            blocked: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Waits until a persist of the gated key is stalled.
    pub async fn wait_until_blocked(&self) {
        self.blocked.notified().await;
    }

    /// Lets stalled and future persists through.
    pub fn release(&self) {
        self.gate.close();
    }
}

#[async_trait]
impl ObjectBackend for GatedBackend {
    async fn load(&self, key: &ObjectKey) -> StorageResult<Option<StoredObject>> {
        self.inner.load(key).await
    }

    async fn persist(&self, object: &StoredObject) -> StorageResult<()> {
        if object.key == self.gated {
            self.blocked.notify_one();
            // Closing the semaphore is the release signal.
            let _ = self.gate.acquire().await;
        }
        self.inner.persist(object).await
    }
}
