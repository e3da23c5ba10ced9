//! Configuration file.

use hearth_core::{
    is_valid_range, MergeRules, DEFAULT_LOWER_SAFETY_TEMP, DEFAULT_UPPER_SAFETY_TEMP,
};
use hearth_mqtt::MqttConfig;
use hearth_protocol::ObjectType;
use hearth_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`HearthConfig`].
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
///
/// ```toml
/// [server]
/// default_poll_timeout_ms = 30000
/// liveness_window_secs = 90
///
/// [storage]
/// path = "/var/lib/hearth/objects.jsonl"
///
/// [mqtt]
/// host = "broker.lan"
/// topic_prefix = "hearth"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    /// Long-poll, presence and merge settings.
    pub server: ServerSection,
    /// Where objects are persisted.
    pub storage: StorageSection,
    /// MQTT bridge; absent disables the bridge.
    pub mqtt: Option<MqttConfig>,
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Poll timeout when the device does not ask for one.
    pub default_poll_timeout_ms: u64,
    /// Shortest honoured poll timeout.
    pub min_poll_timeout_ms: u64,
    /// Longest honoured poll timeout.
    pub max_poll_timeout_ms: u64,
    /// Seconds a device stays connected after its last poll.
    pub liveness_window_secs: u64,
    /// Seconds between presence sweeps.
    pub presence_sweep_interval_secs: u64,
    /// Lower setpoint bound when a record has none.
    pub lower_safety_temp: f64,
    /// Upper setpoint bound when a record has none.
    pub upper_safety_temp: f64,
    /// Object types whose setpoints are clamped.
    pub clamp_types: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            default_poll_timeout_ms: millis(defaults.default_poll_timeout),
            min_poll_timeout_ms: millis(defaults.min_poll_timeout),
            max_poll_timeout_ms: millis(defaults.max_poll_timeout),
            liveness_window_secs: defaults.liveness_window.as_secs(),
            presence_sweep_interval_secs: defaults.presence_sweep_interval.as_secs(),
            lower_safety_temp: DEFAULT_LOWER_SAFETY_TEMP,
            upper_safety_temp: DEFAULT_UPPER_SAFETY_TEMP,
            clamp_types: vec![ObjectType::Shared.to_string()],
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `[storage]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Journal file; objects are kept in memory only when unset.
    pub path: Option<PathBuf>,
}

impl HearthConfig {
    /// Loads a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks ranges and cross-field rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.min_poll_timeout_ms > server.max_poll_timeout_ms {
            return Err(ConfigError::Invalid(
                "min_poll_timeout_ms exceeds max_poll_timeout_ms".into(),
            ));
        }
        if !is_valid_range(server.lower_safety_temp, server.upper_safety_temp) {
            return Err(ConfigError::Invalid(format!(
                "safety temperatures must be finite with lower <= upper, got {} and {}",
                server.lower_safety_temp, server.upper_safety_temp
            )));
        }
        if server.presence_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "presence_sweep_interval_secs must be positive".into(),
            ));
        }
        self.merge_rules()?;
        if let Some(mqtt) = &self.mqtt {
            mqtt.validate()
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        Ok(())
    }

    /// Server configuration described by the `[server]` table.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let server = &self.server;
        Ok(ServerConfig::new()
            .with_poll_timeout(Duration::from_millis(server.default_poll_timeout_ms))
            .with_poll_timeout_range(
                Duration::from_millis(server.min_poll_timeout_ms),
                Duration::from_millis(server.max_poll_timeout_ms),
            )
            .with_liveness_window(Duration::from_secs(server.liveness_window_secs))
            .with_presence_sweep_interval(Duration::from_secs(server.presence_sweep_interval_secs))
            .with_merge_rules(self.merge_rules()?))
    }

    fn merge_rules(&self) -> Result<MergeRules, ConfigError> {
        let server = &self.server;
        let clamp_types = server
            .clamp_types
            .iter()
            .map(|name| {
                ObjectType::from_name(name)
                    .map_err(|err| ConfigError::Invalid(format!("clamp_types: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MergeRules::new()
            .with_default_bounds(server.lower_safety_temp, server.upper_safety_temp)
            .with_clamp_types(clamp_types))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = HearthConfig::parse("").unwrap();
        assert_eq!(config, HearthConfig::default());
        assert!(config.mqtt.is_none());
        assert!(config.validate().is_ok());

        let server = config.server_config().unwrap();
        assert_eq!(server.default_poll_timeout, Duration::from_secs(30));
        assert_eq!(server.liveness_window, Duration::from_secs(90));
        assert!(server.merge_rules.clamps(&ObjectType::Shared));
    }

    #[test]
    fn full_file() {
        let config = HearthConfig::parse(
            r#"
            [server]
            default_poll_timeout_ms = 10000
            liveness_window_secs = 30
            clamp_types = ["shared", "device"]
            upper_safety_temp = 32.0

            [storage]
            path = "/tmp/hearth/objects.jsonl"

            [mqtt]
            host = "broker.lan"
            topic_prefix = "home"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let server = config.server_config().unwrap();
        assert_eq!(server.default_poll_timeout, Duration::from_secs(10));
        assert_eq!(server.liveness_window, Duration::from_secs(30));
        assert!(server.merge_rules.clamps(&ObjectType::Device));
        assert_eq!(server.merge_rules.default_upper, 32.0);
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("/tmp/hearth/objects.jsonl"))
        );
        assert_eq!(config.mqtt.unwrap().topic_prefix, "home");
    }

    #[test]
    fn invalid_values_are_reported() {
        let config = HearthConfig::parse("[server]\nclamp_types = [\"Not A Type\"]").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config =
            HearthConfig::parse("[server]\nmin_poll_timeout_ms = 5000\nmax_poll_timeout_ms = 10")
                .unwrap();
        assert!(config.validate().is_err());

        let config = HearthConfig::parse("[mqtt]\nqos = 7").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_safety_temps_are_rejected() {
        for text in [
            "[server]\nlower_safety_temp = nan",
            "[server]\nupper_safety_temp = inf",
            "[server]\nlower_safety_temp = 30.0\nupper_safety_temp = 10.0",
        ] {
            let config = HearthConfig::parse(text).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn unreadable_file() {
        let err = HearthConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
