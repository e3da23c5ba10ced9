//! # Hearth Server
//!
//! Device-facing synchronization for hearth.
//!
//! This crate provides:
//! - [`TransportChannel`]: long-poll waits that park until a subscribed key
//!   changes or the idle timeout elapses
//! - [`PresenceTracker`]: device connectivity derived from poll activity
//! - [`IntegrationBus`]: fan-out of committed changes to protocol bridges
//! - [`SyncServer`]: the composition root wiring all of the above around
//!   one [`ObjectStore`](hearth_core::ObjectStore)
//!
//! # Architecture
//!
//! ```text
//!  device put / dashboard / api / integration
//!                   │
//!                   ▼
//!             ObjectStore ──change feed──┬──► TransportChannel ──► parked polls
//!                   ▲                    └──► IntegrationBus ──► MQTT, ...
//!                   │
//!  device poll ─────┘ (reads)
//! ```
//!
//! # Protocol
//!
//! 1. A device polls with the revisions it has for its keys
//! 2. Anything newer is returned immediately; otherwise the poll parks
//! 3. The first matching commit resolves the parked poll with that object
//! 4. An idle poll returns an empty timed-out response and the device re-polls

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bus;
mod config;
mod error;
mod integration;
mod presence;
mod server;
mod transport;

pub use bus::IntegrationBus;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use integration::{Integration, IntegrationError};
pub use presence::{PresenceChange, PresenceTracker};
pub use server::SyncServer;
pub use transport::{PollOutcome, TransportChannel};
