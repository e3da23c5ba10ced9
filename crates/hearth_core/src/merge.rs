//! Merge rules applied to every write.
//!
//! Device updates are always partial, so the base rule is a shallow merge
//! where incoming fields win and absent fields are kept. Two overrides run
//! after it, in order:
//!
//! 1. Fan-timer stickiness: while `fan_timer_timeout` in the existing record
//!    is still in the future, the fan fields are restored from the existing
//!    record whatever the incoming update said.
//! 2. Setpoint clamp: target temperatures are clamped into the record's
//!    `[lower_safety_temp, upper_safety_temp]` range (Celsius).

use hearth_protocol::{ObjectType, ObjectValue};
use serde_json::{Number, Value};

/// Lower safety bound used when the record has none.
pub const DEFAULT_LOWER_SAFETY_TEMP: f64 = 7.222;

/// Upper safety bound used when the record has none.
pub const DEFAULT_UPPER_SAFETY_TEMP: f64 = 35.0;

/// Fields kept together while a fan timer is running.
pub const FAN_FIELDS: [&str; 5] = [
    "fan_timer_timeout",
    "fan_control_state",
    "fan_timer_duration",
    "fan_current_speed",
    "fan_mode",
];

/// Setpoint fields subject to the safety clamp.
pub const SETPOINT_FIELDS: [&str; 3] = [
    "target_temperature",
    "target_temperature_low",
    "target_temperature_high",
];

const LOWER_SAFETY_FIELD: &str = "lower_safety_temp";
const UPPER_SAFETY_FIELD: &str = "upper_safety_temp";
const FAN_TIMER_FIELD: &str = "fan_timer_timeout";

/// A setpoint that was moved into the safety range.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampEvent {
    /// Clamped field name.
    pub field: String,
    /// Value the writer asked for.
    pub requested: f64,
    /// Value committed instead.
    pub applied: f64,
    /// Lower bound in force.
    pub lower: f64,
    /// Upper bound in force.
    pub upper: f64,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Value to commit.
    pub value: ObjectValue,
    /// True if the fan fields were restored from the existing record.
    pub fan_timer_restored: bool,
    /// Setpoints that were clamped.
    pub clamps: Vec<ClampEvent>,
}

/// Merge configuration.
#[derive(Debug, Clone)]
pub struct MergeRules {
    /// Lower bound when the record has no `lower_safety_temp`.
    pub default_lower: f64,
    /// Upper bound when the record has no `upper_safety_temp`.
    pub default_upper: f64,
    /// Object types whose setpoints are clamped.
    pub clamp_types: Vec<ObjectType>,
}

impl Default for MergeRules {
    fn default() -> Self {
        Self {
            default_lower: DEFAULT_LOWER_SAFETY_TEMP,
            default_upper: DEFAULT_UPPER_SAFETY_TEMP,
            clamp_types: vec![ObjectType::Shared],
        }
    }
}

impl MergeRules {
    /// Creates the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback safety bounds.
    #[must_use]
    pub fn with_default_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.default_lower = lower;
        self.default_upper = upper;
        self
    }

    /// Sets the object types whose setpoints are clamped.
    #[must_use]
    pub fn with_clamp_types(mut self, types: Vec<ObjectType>) -> Self {
        self.clamp_types = types;
        self
    }

    /// Returns true if setpoints of `object_type` are clamped.
    pub fn clamps(&self, object_type: &ObjectType) -> bool {
        self.clamp_types.contains(object_type)
    }

    /// Merges `incoming` over `existing`.
    ///
    /// `now_secs` is the current Unix time in seconds, compared against
    /// `fan_timer_timeout`.
    pub fn merge(
        &self,
        object_type: &ObjectType,
        existing: &ObjectValue,
        incoming: &ObjectValue,
        now_secs: f64,
    ) -> MergeOutcome {
        let mut value = existing.clone();
        for (field, v) in incoming {
            value.insert(field.clone(), v.clone());
        }

        let fan_timer_restored = fan_timer_active(existing, now_secs);
        if fan_timer_restored {
            for field in FAN_FIELDS {
                match existing.get(field) {
                    Some(v) => {
                        value.insert(field.to_string(), v.clone());
                    }
                    None => {
                        value.remove(field);
                    }
                }
            }
        }

        let clamps = if self.clamps(object_type) {
            self.clamp_setpoints(existing, incoming, &mut value)
        } else {
            Vec::new()
        };

        MergeOutcome {
            value,
            fan_timer_restored,
            clamps,
        }
    }

    /// Fallback bounds, or the built-in defaults if the configured pair is
    /// not a finite ordered range.
    pub fn default_bounds(&self) -> (f64, f64) {
        if is_valid_range(self.default_lower, self.default_upper) {
            (self.default_lower, self.default_upper)
        } else {
            (DEFAULT_LOWER_SAFETY_TEMP, DEFAULT_UPPER_SAFETY_TEMP)
        }
    }

    fn bounds(&self, existing: &ObjectValue) -> (f64, f64) {
        let (default_lower, default_upper) = self.default_bounds();
        let lower = existing
            .get(LOWER_SAFETY_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or(default_lower);
        let upper = existing
            .get(UPPER_SAFETY_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or(default_upper);

        if is_valid_range(lower, upper) {
            (lower, upper)
        } else {
            (default_lower, default_upper)
        }
    }

    fn clamp_setpoints(
        &self,
        existing: &ObjectValue,
        incoming: &ObjectValue,
        value: &mut ObjectValue,
    ) -> Vec<ClampEvent> {
        let (lower, upper) = self.bounds(existing);
        let mut clamps = Vec::new();

        for field in SETPOINT_FIELDS {
            let Some(requested) = incoming.get(field).and_then(Value::as_f64) else {
                continue;
            };
            let applied = requested.clamp(lower, upper);
            if applied == requested {
                continue;
            }
            if let Some(number) = Number::from_f64(applied) {
                value.insert(field.to_string(), Value::Number(number));
                clamps.push(ClampEvent {
                    field: field.to_string(),
                    requested,
                    applied,
                    lower,
                    upper,
                });
            }
        }
        clamps
    }
}

/// `f64::clamp` panics unless both bounds are non-NaN and `lower <= upper`.
pub fn is_valid_range(lower: f64, upper: f64) -> bool {
    lower.is_finite() && upper.is_finite() && lower <= upper
}

fn fan_timer_active(existing: &ObjectValue, now_secs: f64) -> bool {
    existing
        .get(FAN_TIMER_FIELD)
        .and_then(Value::as_f64)
        .is_some_and(|timeout| timeout != 0.0 && timeout > now_secs)
}
