//! # Hearth Core
//!
//! The authoritative object store of a hearth server.
//!
//! This crate provides:
//! - [`MergeRules`]: the protocol merge applied to every write (shallow
//!   merge, fan-timer stickiness, setpoint safety clamp)
//! - [`ObjectStore`]: cache of `{key -> object}` backed by an
//!   [`ObjectBackend`](hearth_storage::ObjectBackend), with a per-key
//!   critical section around merge, persist and revision bump
//! - [`ChangeFeed`]: ordered fan-out of committed [`ChangeEvent`]s
//!
//! ## Key Invariants
//!
//! - Revisions start at 1 and grow by exactly one per committed change
//! - A merge that changes nothing leaves revision and timestamp untouched
//! - Commits on one key are linearized; other keys are never blocked
//! - A change event is emitted only after the value is durable
//!
//! [`ChangeEvent`]: hearth_protocol::ChangeEvent

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change_feed;
mod error;
mod merge;
mod store;

pub use change_feed::{ChangeFeed, ChangeReceiver};
pub use error::{CoreError, CoreResult};
pub use merge::{
    ClampEvent, MergeOutcome, MergeRules, DEFAULT_LOWER_SAFETY_TEMP, DEFAULT_UPPER_SAFETY_TEMP,
    FAN_FIELDS, SETPOINT_FIELDS, is_valid_range,
};
pub use store::{CommitResult, ObjectStore};
