//! Writer identification carried on every commit.

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const INTEGRATION_PREFIX: &str = "integration:";

/// Who produced a write.
///
/// Rendered as `device`, `dashboard`, `api` or `integration:<name>`. The
/// integration form is what the bus matches on to avoid echoing a change
/// back to the bridge that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    /// The thermostat itself.
    Device,
    /// The web dashboard.
    Dashboard,
    /// An API-key client.
    Api,
    /// A protocol bridge, by name.
    Integration(String),
}

impl Source {
    /// Source tag for the named integration.
    pub fn integration(name: impl Into<String>) -> Self {
        Source::Integration(name.into())
    }

    /// Returns true if this write came from the named integration.
    pub fn is_integration(&self, name: &str) -> bool {
        matches!(self, Source::Integration(own) if own == name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Device => f.write_str("device"),
            Source::Dashboard => f.write_str("dashboard"),
            Source::Api => f.write_str("api"),
            Source::Integration(name) => write!(f, "{INTEGRATION_PREFIX}{name}"),
        }
    }
}

impl FromStr for Source {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, KeyError> {
        match s {
            "device" => Ok(Source::Device),
            "dashboard" => Ok(Source::Dashboard),
            "api" => Ok(Source::Api),
            other => match other.strip_prefix(INTEGRATION_PREFIX) {
                Some(name) if !name.is_empty() => Ok(Source::Integration(name.to_string())),
                _ => Err(KeyError::UnknownSource(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Source {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, KeyError> {
        value.parse()
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.to_string()
    }
}
