//! Bridge configuration.

use crate::error::{MqttError, MqttResult};
use crate::topics::{Topics, AVAILABILITY_OFFLINE};
use rumqttc::{LastWill, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the MQTT bridge.
///
/// Every field has a default, so a config file only needs the ones it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Topic prefix.
    pub topic_prefix: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// QoS level for publishes and subscriptions (0, 1 or 2).
    pub qos: u8,
    /// Publish state and availability as retained messages.
    pub retain: bool,
    /// Publish each field on its own topic besides the whole object.
    pub publish_fields: bool,
    /// Announce the bridge itself on `{prefix}/bridge/availability`, with an
    /// `offline` last will.
    pub bridge_availability: bool,
    /// Delay before reconnecting after a connection error, in seconds.
    pub reconnect_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "hearth".to_string(),
            username: None,
            password: None,
            topic_prefix: "hearth".to_string(),
            keep_alive_secs: 30,
            qos: 1,
            retain: true,
            publish_fields: true,
            bridge_availability: true,
            reconnect_delay_secs: 5,
        }
    }
}

impl MqttConfig {
    /// Creates a configuration for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Sets the client identifier.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Enables or disables per-field publishing.
    pub fn with_publish_fields(mut self, publish_fields: bool) -> Self {
        self.publish_fields = publish_fields;
        self
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Config`] for an invalid QoS, an empty or
    /// wildcard prefix, or an empty host.
    pub fn validate(&self) -> MqttResult<()> {
        self.qos_level()?;
        if self.host.is_empty() {
            return Err(MqttError::Config("empty broker host".into()));
        }
        let prefix = self.topic_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains(['+', '#']) {
            return Err(MqttError::Config(format!(
                "invalid topic prefix {:?}",
                self.topic_prefix
            )));
        }
        Ok(())
    }

    /// The configured QoS.
    pub fn qos_level(&self) -> MqttResult<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::Config(format!("invalid qos {other}"))),
        }
    }

    /// Topic builder for this configuration.
    pub fn topics(&self) -> Topics {
        Topics::new(&self.topic_prefix)
    }

    /// Delay before reconnecting.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Builds rumqttc options.
    pub fn mqtt_options(&self) -> MqttResult<MqttOptions> {
        self.validate()?;
        let qos = self.qos_level()?;

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)));
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        if self.bridge_availability {
            options.set_last_will(LastWill::new(
                self.topics().bridge_availability_topic(),
                AVAILABILITY_OFFLINE,
                qos,
                true,
            ));
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic_prefix, "hearth");
        assert!(config.publish_fields);
        assert!(config.validate().is_ok());
        assert_eq!(config.qos_level().unwrap(), QoS::AtLeastOnce);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: MqttConfig =
            serde_json::from_str(r#"{"host": "broker.lan", "qos": 0}"#).unwrap();
        assert_eq!(config.host, "broker.lan");
        assert_eq!(config.qos_level().unwrap(), QoS::AtMostOnce);
        assert_eq!(config.client_id, "hearth");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = MqttConfig::default();
        config.qos = 3;
        assert!(matches!(config.validate(), Err(MqttError::Config(_))));

        let config = MqttConfig::default().with_topic_prefix("home/#");
        assert!(config.validate().is_err());

        let config = MqttConfig::new("", 1883);
        assert!(config.validate().is_err());
    }

    #[test]
    fn options_carry_settings() {
        let config = MqttConfig::new("broker.lan", 8883)
            .with_client_id("hearth-test")
            .with_auth("user", "secret");
        let options = config.mqtt_options().unwrap();
        assert_eq!(options.broker_address(), ("broker.lan".to_string(), 8883));
        assert_eq!(options.client_id(), "hearth-test");
        assert!(options.last_will().is_some());
    }
}
