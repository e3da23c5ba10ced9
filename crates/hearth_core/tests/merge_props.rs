//! Property tests for the setpoint clamp.

use hearth_core::MergeRules;
use hearth_protocol::ObjectType;
use hearth_testkit::{json_value, setpoint_strategy};
use proptest::prelude::*;
use serde_json::json;

const NOW: f64 = 1_700_000_000.0;

proptest! {
    #[test]
    fn clamped_setpoint_lies_within_record_bounds(
        a in setpoint_strategy(),
        b in setpoint_strategy(),
        requested in setpoint_strategy(),
    ) {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        let existing = json_value(json!({
            "lower_safety_temp": lower,
            "upper_safety_temp": upper,
        }));
        let incoming = json_value(json!({"target_temperature": requested}));

        let outcome = MergeRules::default().merge(&ObjectType::Shared, &existing, &incoming, NOW);
        let applied = outcome.value["target_temperature"].as_f64().unwrap();

        prop_assert!(applied >= lower && applied <= upper);
        if requested >= lower && requested <= upper {
            prop_assert_eq!(applied, requested);
            prop_assert!(outcome.clamps.is_empty());
        } else {
            prop_assert_eq!(outcome.clamps.len(), 1);
            prop_assert_eq!(outcome.clamps[0].requested, requested);
        }
    }

    #[test]
    fn unclamped_types_keep_any_setpoint(requested in setpoint_strategy()) {
        let incoming = json_value(json!({"target_temperature": requested}));
        let outcome = MergeRules::default().merge(
            &ObjectType::Device,
            &json_value(json!({})),
            &incoming,
            NOW,
        );
        prop_assert_eq!(outcome.value["target_temperature"].as_f64(), Some(requested));
    }
}
