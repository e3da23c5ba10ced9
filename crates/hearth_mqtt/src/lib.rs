//! # Hearth MQTT
//!
//! Bridges the object store to an MQTT broker.
//!
//! ## Topic conventions
//!
//! Under a configurable prefix (default `hearth`):
//!
//! | Topic pattern | Direction | Purpose |
//! |---------------|-----------|---------|
//! | `{prefix}/{serial}/{type}` | hearth → broker | Whole object as JSON |
//! | `{prefix}/{serial}/{type}/{field}` | hearth → broker | One field |
//! | `{prefix}/{serial}/{type}/{field}/set` | broker → hearth | Write one field |
//! | `{prefix}/{serial}/availability` | hearth → broker | `online` / `offline` |
//! | `{prefix}/bridge/availability` | hearth → broker | Bridge last will |
//!
//! Only `device` and `shared` objects accept commands. A command payload is
//! parsed as JSON when possible and taken as a plain string otherwise.
//!
//! Writes made by this bridge are tagged `integration:mqtt`, so the
//! integration bus never echoes them back to the broker.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bridge;
mod config;
mod error;
mod payload;
mod publisher;
mod topics;

pub use bridge::{MqttIntegration, MQTT_INTEGRATION_NAME};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use payload::{encode_field, parse_payload};
pub use publisher::{MqttPublisher, RumqttcPublisher};
pub use topics::{CommandTarget, Topics, AVAILABILITY_OFFLINE, AVAILABILITY_ONLINE};
