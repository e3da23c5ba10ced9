//! Append-only file backend.

use crate::backend::ObjectBackend;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use hearth_protocol::{ObjectKey, StoredObject};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A file-based storage backend.
///
/// Every persisted record is appended to the file as one JSON line. On open
/// the file is replayed and the last record per key wins, so the file is the
/// full commit history and the index holds the latest state.
///
/// # Durability
///
/// `persist` writes the line and calls `File::sync_data()` before returning.
/// A torn final line left by a crash is cut off on the next open, and a
/// failed append truncates its partial record, so later appends always start
/// on a fresh line. A bad line anywhere else is reported as corruption.
///
/// # Example
///
/// ```no_run
/// use hearth_storage::FileBackend;
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("objects.jsonl")).unwrap();
/// println!("{} objects", backend.len());
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    inner: Arc<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    path: PathBuf,
    file: Mutex<File>,
    index: RwLock<HashMap<ObjectKey, StoredObject>>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a record before the
    /// last line cannot be decoded.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let replayed = if path.exists() {
            Self::replay(path)?
        } else {
            Replay::default()
        };

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if replayed.good_len < on_disk {
            warn!(
                path = %path.display(),
                dropped = on_disk - replayed.good_len,
                "truncating torn tail"
            );
            file.set_len(replayed.good_len)?;
        }
        if replayed.missing_newline {
            file.write_all(b"\n")?;
        }
        if replayed.good_len < on_disk || replayed.missing_newline {
            file.sync_data()?;
        }
        debug!(path = %path.display(), objects = replayed.index.len(), "opened object file");

        Ok(Self {
            inner: Arc::new(FileInner {
                path: path.to_path_buf(),
                file: Mutex::new(file),
                index: RwLock::new(replayed.index),
            }),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of distinct keys on file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.index.read().len()
    }

    /// Returns true if no records are on file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.index.read().is_empty()
    }

    /// Latest record of every key, sorted by key.
    #[must_use]
    pub fn objects(&self) -> Vec<StoredObject> {
        let mut objects: Vec<StoredObject> = self.inner.index.read().values().cloned().collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects
    }

    fn replay(path: &Path) -> StorageResult<Replay> {
        let data = std::fs::read(path)?;
        let segments: Vec<&[u8]> = data.split(|b| *b == b'\n').collect();
        let last = segments
            .iter()
            .rposition(|segment| !segment.trim_ascii().is_empty())
            .unwrap_or(0);

        let mut replayed = Replay::default();
        let mut offset = 0usize;
        for (number, segment) in segments.iter().enumerate() {
            let end = offset + segment.len();
            let terminated = end < data.len();
            let next = if terminated { end + 1 } else { end };

            if segment.trim_ascii().is_empty() {
                offset = next;
                continue;
            }
            match serde_json::from_slice::<StoredObject>(segment) {
                Ok(object) => {
                    replayed.index.insert(object.key.clone(), object);
                    replayed.good_len = next as u64;
                    replayed.missing_newline = !terminated;
                }
                Err(e) if number == last => {
                    warn!(path = %path.display(), error = %e, "skipping torn final record");
                    break;
                }
                Err(e) => {
                    return Err(StorageError::Corrupted(format!(
                        "line {}: {}",
                        number + 1,
                        e
                    )));
                }
            }
            offset = next;
        }
        Ok(replayed)
    }
}

/// Result of replaying the file: the index and where the intact prefix ends.
#[derive(Debug, Default)]
struct Replay {
    index: HashMap<ObjectKey, StoredObject>,
    good_len: u64,
    missing_newline: bool,
}

impl FileInner {
    fn append(&self, object: &StoredObject) -> StorageResult<()> {
        let mut line = serde_json::to_vec(object)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        if let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) {
            // Drop a partial record so the next append starts on a clean line.
            if let Err(truncate) = file.set_len(len) {
                warn!(path = %self.path.display(), error = %truncate, "failed to drop partial record");
            }
            return Err(e.into());
        }
        drop(file);

        self.index.write().insert(object.key.clone(), object.clone());
        Ok(())
    }
}

#[async_trait]
impl ObjectBackend for FileBackend {
    async fn load(&self, key: &ObjectKey) -> StorageResult<Option<StoredObject>> {
        Ok(self.inner.index.read().get(key).cloned())
    }

    async fn persist(&self, object: &StoredObject) -> StorageResult<()> {
        let inner = Arc::clone(&self.inner);
        let object = object.clone();
        tokio::task::spawn_blocking(move || inner.append(&object))
            .await
            .map_err(|e| StorageError::Unavailable(format!("writer task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn object(key: &str, revision: u64, temp: f64) -> StoredObject {
        let value = json!({ "current_temperature": temp })
            .as_object()
            .cloned()
            .unwrap();
        StoredObject::new(ObjectKey::parse(key).unwrap(), value, revision, 1_000)
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn persist_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.persist(&object("device.A", 1, 20.0)).await.unwrap();
            backend.persist(&object("device.A", 2, 21.0)).await.unwrap();
            backend.persist(&object("shared.A", 1, 0.0)).await.unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len(), 2);
        let key = ObjectKey::parse("device.A").unwrap();
        let loaded = backend.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 2);
        assert_eq!(loaded.value["current_temperature"], json!(21.0));

        let keys: Vec<String> = backend.objects().iter().map(|o| o.key.to_string()).collect();
        assert_eq!(keys, vec!["device.A", "shared.A"]);
    }

    #[test]
    fn torn_final_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");
        let good = serde_json::to_string(&object("device.A", 1, 20.0)).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"key\":\"device.A\",\"val")).unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn writes_after_torn_tail_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");
        let good = serde_json::to_string(&object("device.A", 1, 20.0)).unwrap();
        std::fs::write(&path, format!("{good}\n{{\"key\":\"device.A\",\"val")).unwrap();

        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(std::fs::metadata(&path).unwrap().len(), good.len() as u64 + 1);
            backend.persist(&object("device.A", 2, 21.0)).await.unwrap();
            backend.persist(&object("device.A", 3, 22.0)).await.unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        let key = ObjectKey::parse("device.A").unwrap();
        let loaded = backend.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 3);
        assert_eq!(loaded.value["current_temperature"], json!(22.0));
    }

    #[tokio::test]
    async fn unterminated_final_record_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");
        let good = serde_json::to_string(&object("device.A", 1, 20.0)).unwrap();
        std::fs::write(&path, &good).unwrap();

        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.len(), 1);
            backend.persist(&object("shared.A", 1, 0.0)).await.unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn corrupt_middle_line_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("objects.jsonl");
        let good = serde_json::to_string(&object("device.A", 1, 20.0)).unwrap();
        std::fs::write(&path, format!("garbage\n{good}\n")).unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("objects.jsonl");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path.as_path());
    }
}
