//! Topic layout.

use hearth_protocol::{KeyResult, ObjectKey, ObjectType};

/// Availability payload of a connected device or a running bridge.
pub const AVAILABILITY_ONLINE: &str = "online";
/// Availability payload of a disconnected device or a stopped bridge.
pub const AVAILABILITY_OFFLINE: &str = "offline";

const COMMAND_SUFFIX: &str = "set";

/// Where an inbound command writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    /// Device serial.
    pub serial: String,
    /// Object type.
    pub object_type: ObjectType,
    /// Field to write.
    pub field: String,
}

impl CommandTarget {
    /// Key of the targeted object.
    pub fn key(&self) -> KeyResult<ObjectKey> {
        ObjectKey::build(self.object_type.clone(), self.serial.clone())
    }

    /// Returns true if commands may write this object type.
    pub fn is_writable(&self) -> bool {
        matches!(self.object_type, ObjectType::Device | ObjectType::Shared)
    }
}

/// Topic builder and parser for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    /// Creates a builder. Leading and trailing slashes are dropped.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// The prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}/{serial}/{type}`
    pub fn state_topic(&self, serial: &str, object_type: &ObjectType) -> String {
        format!("{}/{serial}/{object_type}", self.prefix)
    }

    /// `{prefix}/{serial}/{type}/{field}`
    pub fn field_topic(&self, serial: &str, object_type: &ObjectType, field: &str) -> String {
        format!("{}/{serial}/{object_type}/{field}", self.prefix)
    }

    /// `{prefix}/{serial}/{type}/{field}/set`
    pub fn command_topic(&self, serial: &str, object_type: &ObjectType, field: &str) -> String {
        format!("{}/{serial}/{object_type}/{field}/{COMMAND_SUFFIX}", self.prefix)
    }

    /// `{prefix}/{serial}/availability`
    pub fn availability_topic(&self, serial: &str) -> String {
        format!("{}/{serial}/availability", self.prefix)
    }

    /// `{prefix}/bridge/availability`
    pub fn bridge_availability_topic(&self) -> String {
        format!("{}/bridge/availability", self.prefix)
    }

    /// Wildcard subscriptions covering every writable command topic.
    pub fn command_subscriptions(&self) -> Vec<String> {
        [ObjectType::Device, ObjectType::Shared]
            .iter()
            .map(|object_type| format!("{}/+/{object_type}/+/{COMMAND_SUFFIX}", self.prefix))
            .collect()
    }

    /// Parses a command topic.
    ///
    /// Returns `None` for anything that is not
    /// `{prefix}/{serial}/{type}/{field}/set` with non-empty segments and a
    /// valid object type.
    pub fn parse_command(&self, topic: &str) -> Option<CommandTarget> {
        let rest = topic.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        let [serial, object_type, field, suffix] = segments.as_slice() else {
            return None;
        };
        if *suffix != COMMAND_SUFFIX || serial.is_empty() || field.is_empty() {
            return None;
        }
        let object_type = ObjectType::from_name(object_type).ok()?;
        Some(CommandTarget {
            serial: (*serial).to_string(),
            object_type,
            field: (*field).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("hearth")
    }

    #[test]
    fn builds_topics() {
        let t = topics();
        assert_eq!(t.state_topic("ABC123", &ObjectType::Shared), "hearth/ABC123/shared");
        assert_eq!(
            t.field_topic("ABC123", &ObjectType::Device, "fan_mode"),
            "hearth/ABC123/device/fan_mode"
        );
        assert_eq!(
            t.command_topic("ABC123", &ObjectType::Shared, "target_temperature"),
            "hearth/ABC123/shared/target_temperature/set"
        );
        assert_eq!(t.availability_topic("ABC123"), "hearth/ABC123/availability");
        assert_eq!(t.bridge_availability_topic(), "hearth/bridge/availability");
        assert_eq!(
            t.command_subscriptions(),
            vec!["hearth/+/device/+/set", "hearth/+/shared/+/set"]
        );
    }

    #[test]
    fn parses_command_topic() {
        let target = topics()
            .parse_command("hearth/ABC123/shared/target_temperature/set")
            .unwrap();
        assert_eq!(target.serial, "ABC123");
        assert_eq!(target.object_type, ObjectType::Shared);
        assert_eq!(target.field, "target_temperature");
        assert!(target.is_writable());
        assert_eq!(target.key().unwrap().to_string(), "shared.ABC123");
    }

    #[test]
    fn command_topic_round_trips() {
        let t = Topics::new("home/hvac/");
        let topic = t.command_topic("02AA.01", &ObjectType::Device, "fan_mode");
        let target = t.parse_command(&topic).unwrap();
        assert_eq!(target.serial, "02AA.01");
        assert_eq!(target.field, "fan_mode");
    }

    #[test]
    fn malformed_topics_are_ignored() {
        let t = topics();
        for topic in [
            "other/ABC123/shared/target_temperature/set",
            "hearthx/ABC123/shared/target_temperature/set",
            "hearth/ABC123/shared/target_temperature",
            "hearth/ABC123/shared/target_temperature/get",
            "hearth/ABC123/shared/set",
            "hearth/ABC123/shared/a/b/set",
            "hearth//shared/target_temperature/set",
            "hearth/ABC123/shared//set",
            "hearth/ABC123/Bad-Type/field/set",
            "hearth",
        ] {
            assert_eq!(t.parse_command(topic), None, "{topic}");
        }
    }

    #[test]
    fn non_writable_types_parse_but_are_flagged() {
        let target = topics()
            .parse_command("hearth/ABC123/structure/away/set")
            .unwrap();
        assert!(!target.is_writable());
    }
}
