//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use hearth_protocol::{ObjectKey, ObjectType};
use proptest::prelude::*;

/// Strategy for generating device serials, some of them containing dots.
pub fn serial_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z0-9]{1,12}(\\.[A-Za-z0-9_-]{1,6}){0,2}")
        .expect("Invalid regex")
}

/// Strategy for generating object types, including custom ones.
pub fn object_type_strategy() -> impl Strategy<Value = ObjectType> {
    prop_oneof![
        Just(ObjectType::Device),
        Just(ObjectType::Shared),
        Just(ObjectType::Structure),
        Just(ObjectType::User),
        Just(ObjectType::Link),
        Just(ObjectType::DeviceAlertDialog),
        Just(ObjectType::Schedule),
        Just(ObjectType::Track),
        Just(ObjectType::Message),
        Just(ObjectType::Where),
        Just(ObjectType::DemandResponse),
        Just(ObjectType::Tou),
        Just(ObjectType::RcsSettings),
        prop::string::string_regex("custom_[a-z0-9_]{1,8}")
            .expect("Invalid regex")
            .prop_map(ObjectType::Other),
    ]
}

/// Strategy for generating valid object keys.
pub fn object_key_strategy() -> impl Strategy<Value = ObjectKey> {
    (object_type_strategy(), serial_strategy())
        .prop_map(|(object_type, id)| ObjectKey::build(object_type, id).expect("valid key"))
}

/// Strategy for a sequence of small values written to one key.
///
/// The value range is small so consecutive repeats (no-op writes) are
/// common.
pub fn revision_sequence_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..30)
}

/// Strategy for setpoint temperatures, in and outside the safety range.
pub fn setpoint_strategy() -> impl Strategy<Value = f64> {
    -20.0f64..60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_keys_parse(key in object_key_strategy()) {
            let parsed = ObjectKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
