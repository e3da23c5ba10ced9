//! # Hearth Testkit
//!
//! Test utilities for hearth.
//!
//! This crate provides:
//! - Fixtures for keys, values and ready-to-use servers
//! - Storage backends that fail or stall on demand
//! - A recording integration for bus tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hearth_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_server() {
//!     let server = test_server();
//!     server.commit(&key("device.A"), json_value(json!({"t": 1})), Source::Api).await?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backends;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use backends::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
