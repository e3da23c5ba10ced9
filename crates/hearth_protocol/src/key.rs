//! Object keys of the form `{objectType}.{id}`.

use crate::error::{KeyError, KeyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type segment of an object key.
///
/// The known types cover what legacy thermostat firmware subscribes to.
/// Anything else is carried as [`ObjectType::Other`] so newer firmware keys
/// still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectType {
    /// Per-device sensor and configuration record.
    Device,
    /// Record shared between device and user (setpoints, mode).
    Shared,
    /// A home grouping several devices.
    Structure,
    /// A user account record.
    User,
    /// Device to structure link.
    Link,
    /// Pending on-device alert dialog.
    DeviceAlertDialog,
    /// Heating/cooling schedule.
    Schedule,
    /// Connectivity tracking record.
    Track,
    /// Account message.
    Message,
    /// Named locations within a structure.
    Where,
    /// Demand response events.
    DemandResponse,
    /// Time-of-use pricing.
    Tou,
    /// Remote comfort sensor settings.
    RcsSettings,
    /// Any other lowercase type name.
    Other(String),
}

impl ObjectType {
    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Device => "device",
            ObjectType::Shared => "shared",
            ObjectType::Structure => "structure",
            ObjectType::User => "user",
            ObjectType::Link => "link",
            ObjectType::DeviceAlertDialog => "device_alert_dialog",
            ObjectType::Schedule => "schedule",
            ObjectType::Track => "track",
            ObjectType::Message => "message",
            ObjectType::Where => "where",
            ObjectType::DemandResponse => "demand_response",
            ObjectType::Tou => "tou",
            ObjectType::RcsSettings => "rcs_settings",
            ObjectType::Other(name) => name,
        }
    }

    /// Parses a type name.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidType`] if the name is empty or contains
    /// anything but lowercase ASCII letters, digits and `_`.
    pub fn from_name(name: &str) -> KeyResult<Self> {
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !valid {
            return Err(KeyError::InvalidType(name.to_string()));
        }

        Ok(match name {
            "device" => ObjectType::Device,
            "shared" => ObjectType::Shared,
            "structure" => ObjectType::Structure,
            "user" => ObjectType::User,
            "link" => ObjectType::Link,
            "device_alert_dialog" => ObjectType::DeviceAlertDialog,
            "schedule" => ObjectType::Schedule,
            "track" => ObjectType::Track,
            "message" => ObjectType::Message,
            "where" => ObjectType::Where,
            "demand_response" => ObjectType::DemandResponse,
            "tou" => ObjectType::Tou,
            "rcs_settings" => ObjectType::RcsSettings,
            other => ObjectType::Other(other.to_string()),
        })
    }

    /// Returns true if keys of this type use a device serial as their id.
    pub fn is_serial_scoped(&self) -> bool {
        matches!(
            self,
            ObjectType::Device
                | ObjectType::Shared
                | ObjectType::Link
                | ObjectType::DeviceAlertDialog
                | ObjectType::Schedule
                | ObjectType::Track
                | ObjectType::RcsSettings
                | ObjectType::Tou
                | ObjectType::DemandResponse
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = KeyError;

    fn from_str(s: &str) -> KeyResult<Self> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for ObjectType {
    type Error = KeyError;

    fn try_from(value: String) -> KeyResult<Self> {
        Self::from_name(&value)
    }
}

impl From<ObjectType> for String {
    fn from(object_type: ObjectType) -> Self {
        object_type.as_str().to_string()
    }
}

/// Key addressing one synchronized record: `{objectType}.{id}`.
///
/// The id is everything after the first `.`, so ids containing dots
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey {
    object_type: ObjectType,
    id: String,
}

impl ObjectKey {
    /// Builds a key from its parts.
    ///
    /// The type is normalized by name, so `Other("device")` becomes
    /// [`ObjectType::Device`] and the key equals its parsed form.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyId`] if `id` is empty, or
    /// [`KeyError::InvalidType`] if an `Other` name is not a valid type name.
    pub fn build(object_type: ObjectType, id: impl Into<String>) -> KeyResult<Self> {
        let object_type = match object_type {
            ObjectType::Other(name) => ObjectType::from_name(&name)?,
            known => known,
        };
        let id = id.into();
        if id.is_empty() {
            return Err(KeyError::EmptyId(format!("{object_type}.")));
        }
        Ok(Self { object_type, id })
    }

    /// Parses `{objectType}.{id}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator is missing, the type is invalid or
    /// the id is empty.
    pub fn parse(key: &str) -> KeyResult<Self> {
        let (type_name, id) = key
            .split_once('.')
            .ok_or_else(|| KeyError::MissingSeparator(key.to_string()))?;
        let object_type = ObjectType::from_name(type_name)?;
        if id.is_empty() {
            return Err(KeyError::EmptyId(key.to_string()));
        }
        Ok(Self {
            object_type,
            id: id.to_string(),
        })
    }

    /// `device.{serial}`.
    pub fn device(serial: &str) -> KeyResult<Self> {
        Self::build(ObjectType::Device, serial)
    }

    /// `shared.{serial}`.
    pub fn shared(serial: &str) -> KeyResult<Self> {
        Self::build(ObjectType::Shared, serial)
    }

    /// Keys a freshly paired device subscribes to.
    pub fn device_keys(serial: &str) -> KeyResult<Vec<Self>> {
        Ok(vec![Self::device(serial)?, Self::shared(serial)?])
    }

    /// Returns the object type.
    pub fn object_type(&self) -> &ObjectType {
        &self.object_type
    }

    /// Returns the id segment.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the device serial for serial-scoped types.
    pub fn serial(&self) -> Option<&str> {
        self.object_type
            .is_serial_scoped()
            .then_some(self.id.as_str())
    }

    /// Splits the key back into its parts.
    pub fn into_parts(self) -> (ObjectType, String) {
        (self.object_type, self.id)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object_type, self.id)
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> KeyResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = KeyError;

    fn try_from(value: String) -> KeyResult<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_key() {
        let key = ObjectKey::parse("device.02AA01AC").unwrap();
        assert_eq!(key.object_type(), &ObjectType::Device);
        assert_eq!(key.id(), "02AA01AC");
        assert_eq!(key.serial(), Some("02AA01AC"));
        assert_eq!(key.to_string(), "device.02AA01AC");
    }

    #[test]
    fn id_keeps_dots() {
        let key = ObjectKey::parse("structure.a.b.c").unwrap();
        assert_eq!(key.object_type(), &ObjectType::Structure);
        assert_eq!(key.id(), "a.b.c");
        assert_eq!(key.serial(), None);
    }

    #[test]
    fn unknown_type_is_preserved() {
        let key = ObjectKey::parse("widget_v2.X1").unwrap();
        assert_eq!(key.object_type(), &ObjectType::Other("widget_v2".into()));
        assert_eq!(key.to_string(), "widget_v2.X1");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            ObjectKey::parse("device"),
            Err(KeyError::MissingSeparator(_))
        ));
        assert!(matches!(
            ObjectKey::parse(".ABC"),
            Err(KeyError::InvalidType(_))
        ));
        assert!(matches!(
            ObjectKey::parse("Device.ABC"),
            Err(KeyError::InvalidType(_))
        ));
        assert!(matches!(
            ObjectKey::parse("device."),
            Err(KeyError::EmptyId(_))
        ));
        assert!(ObjectKey::build(ObjectType::Shared, "").is_err());
    }

    #[test]
    fn device_keys_for_serial() {
        let keys = ObjectKey::device_keys("ABC123").unwrap();
        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["device.ABC123", "shared.ABC123"]);
    }

    #[test]
    fn serde_as_string() {
        let key = ObjectKey::shared("ABC123").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"shared.ABC123\"");

        let back: ObjectKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<ObjectKey>("\"nodot\"").is_err());
    }

    #[test]
    fn object_type_serde_as_name() {
        let json = serde_json::to_string(&ObjectType::DeviceAlertDialog).unwrap();
        assert_eq!(json, "\"device_alert_dialog\"");
        let back: ObjectType = serde_json::from_str("\"widget_v2\"").unwrap();
        assert_eq!(back, ObjectType::Other("widget_v2".into()));
        assert!(serde_json::from_str::<ObjectType>("\"Not A Type\"").is_err());
    }

    #[test]
    fn build_normalizes_other_type() {
        let built = ObjectKey::build(ObjectType::Other("device".into()), "X").unwrap();
        assert_eq!(built, ObjectKey::parse("device.X").unwrap());
        assert_eq!(built.object_type(), &ObjectType::Device);
        assert_eq!(built.serial(), Some("X"));

        assert!(matches!(
            ObjectKey::build(ObjectType::Other("Bad Name".into()), "X"),
            Err(KeyError::InvalidType(_))
        ));
    }
}
