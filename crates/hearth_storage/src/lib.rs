//! # Hearth Storage
//!
//! Persistence backends for the hearth object store.
//!
//! The object store keeps the authoritative in-memory copy of every object;
//! a backend only has to make committed values durable and hand them back
//! on first access.
//!
//! ## Design Principles
//!
//! - Backends store whole [`StoredObject`](hearth_protocol::StoredObject)
//!   records keyed by object key
//! - No knowledge of merge rules, revisions or subscribers
//! - Must be `Send + Sync` for concurrent access
//! - A failed `persist` means the write did not happen
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral deployments
//! - [`FileBackend`] - Append-only JSON lines file

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::ObjectBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
