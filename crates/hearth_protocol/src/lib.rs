//! # Hearth Protocol
//!
//! Object keys, change events and transport messages for hearth.
//!
//! This crate provides:
//! - `ObjectKey` / `ObjectType` for `{objectType}.{id}` keys
//! - `Source` tags identifying who produced a write
//! - `StoredObject` and `ChangeEvent`, the units of synchronization
//! - Long-poll, put and claim messages exchanged with the HTTP layer
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod messages;
mod object;
mod source;

pub use error::{KeyError, KeyResult};
pub use key::{ObjectKey, ObjectType};
pub use messages::{ClaimRequest, PollRequest, PollResponse, PutRequest, PutResponse};
pub use object::{ChangeEvent, ObjectValue, StoredObject};
pub use source::Source;
