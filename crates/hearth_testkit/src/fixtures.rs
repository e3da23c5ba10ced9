//! Test fixtures and server helpers.

use hearth_protocol::{ObjectKey, ObjectValue};
use hearth_server::{ServerConfig, SyncServer};
use hearth_storage::{FileBackend, InMemoryBackend};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Parses a key, panicking on invalid input.
pub fn key(s: &str) -> ObjectKey {
    ObjectKey::parse(s).expect("invalid test key")
}

/// Converts a JSON object literal into an object value.
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn json_value(value: serde_json::Value) -> ObjectValue {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Server configuration with timeouts short enough for tests.
pub fn fast_config() -> ServerConfig {
    ServerConfig::new()
        .with_poll_timeout(Duration::from_millis(200))
        .with_poll_timeout_range(Duration::from_millis(10), Duration::from_secs(10))
        .with_presence_sweep_interval(Duration::from_millis(20))
}

/// Starts an in-memory server with [`fast_config`].
///
/// Must be called inside a Tokio runtime.
pub fn test_server() -> SyncServer {
    SyncServer::start(Arc::new(InMemoryBackend::new()), fast_config())
}

/// Starts an in-memory server with `config`.
pub fn test_server_with(config: ServerConfig) -> SyncServer {
    SyncServer::start(Arc::new(InMemoryBackend::new()), config)
}

/// A file-backed server with automatic cleanup.
pub struct FileServer {
    /// The server instance.
    pub server: SyncServer,
    /// The backend, for inspecting what was persisted.
    pub backend: FileBackend,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl FileServer {
    /// Starts a server over a fresh journal file.
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FileBackend::open_with_create_dirs(&temp_dir.path().join("objects.jsonl"))
            .expect("Failed to open file backend");
        let server = SyncServer::start(Arc::new(backend.clone()), fast_config());
        Self {
            server,
            backend,
            _temp_dir: temp_dir,
        }
    }
}

impl std::ops::Deref for FileServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Polls `condition` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if the condition does not hold within `timeout`.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
