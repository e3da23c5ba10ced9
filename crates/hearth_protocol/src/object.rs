//! Stored objects and the change events emitted when they are committed.

use crate::key::{ObjectKey, ObjectType};
use crate::source::Source;
use serde::{Deserialize, Serialize};

/// Field map of an object. The schema depends on the object type and is
/// not validated here.
pub type ObjectValue = serde_json::Map<String, serde_json::Value>;

/// A committed object as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object key.
    pub key: ObjectKey,
    /// Current field values.
    pub value: ObjectValue,
    /// Starts at 1, bumped by exactly one on every committed change.
    pub revision: u64,
    /// Commit time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl StoredObject {
    /// Creates a stored object.
    pub fn new(key: ObjectKey, value: ObjectValue, revision: u64, timestamp: u64) -> Self {
        Self {
            key,
            value,
            revision,
            timestamp,
        }
    }

    /// Returns true if this object is newer than `since`.
    pub fn is_newer_than(&self, since: u64) -> bool {
        self.revision > since
    }
}

/// A single change event.
///
/// Emitted exactly once per committed write, after the value is durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Key that changed.
    pub key: ObjectKey,
    /// Type segment of the key.
    pub object_type: ObjectType,
    /// Device serial, for serial-scoped keys.
    pub serial: Option<String>,
    /// New revision.
    pub revision: u64,
    /// Commit time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Full value after the commit.
    pub value: ObjectValue,
    /// Who wrote it.
    pub source: Source,
}

impl ChangeEvent {
    /// Builds the event for a freshly committed object.
    pub fn committed(object: &StoredObject, source: Source) -> Self {
        Self {
            key: object.key.clone(),
            object_type: object.key.object_type().clone(),
            serial: object.key.serial().map(str::to_string),
            revision: object.revision,
            timestamp: object.timestamp,
            value: object.value.clone(),
            source,
        }
    }

    /// The object as it stands after this event.
    pub fn to_object(&self) -> StoredObject {
        StoredObject::new(
            self.key.clone(),
            self.value.clone(),
            self.revision,
            self.timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(v: serde_json::Value) -> ObjectValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn event_carries_serial_for_device_keys() {
        let object = StoredObject::new(
            ObjectKey::parse("shared.ABC123").unwrap(),
            value(json!({"target_temperature": 20.0})),
            4,
            1_700_000_000_000,
        );
        let event = ChangeEvent::committed(&object, Source::Dashboard);
        assert_eq!(event.serial.as_deref(), Some("ABC123"));
        assert_eq!(event.object_type, ObjectType::Shared);
        assert_eq!(event.revision, 4);
        assert_eq!(event.to_object(), object);
    }

    #[test]
    fn event_has_no_serial_for_account_keys() {
        let object = StoredObject::new(
            ObjectKey::parse("structure.s-1").unwrap(),
            ObjectValue::new(),
            1,
            0,
        );
        let event = ChangeEvent::committed(&object, Source::Api);
        assert!(event.serial.is_none());
    }

    #[test]
    fn change_event_serde_roundtrip() {
        let object = StoredObject::new(
            ObjectKey::parse("device.ABC123").unwrap(),
            value(json!({"fan_mode": "auto", "current_temperature": 21.5})),
            3,
            1_700_000_000_000,
        );
        let event = ChangeEvent::committed(&object, Source::integration("mqtt"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["key"], json!("device.ABC123"));
        assert_eq!(json["object_type"], json!("device"));
        assert_eq!(json["serial"], json!("ABC123"));

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn newer_than() {
        let object = StoredObject::new(
            ObjectKey::parse("device.A").unwrap(),
            ObjectValue::new(),
            6,
            0,
        );
        assert!(object.is_newer_than(5));
        assert!(!object.is_newer_than(6));
    }
}
