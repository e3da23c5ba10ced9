//! Payload encoding for single fields.

use crate::error::{MqttError, MqttResult};
use serde_json::Value;

/// Parses a command payload.
///
/// Valid JSON (numbers, booleans, objects, quoted strings) is taken as is;
/// any other text becomes a string value.
///
/// # Errors
///
/// Returns [`MqttError::MalformedCommand`] for an empty or non-UTF-8
/// payload.
pub fn parse_payload(topic: &str, payload: &[u8]) -> MqttResult<Value> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| MqttError::malformed(topic, "payload is not UTF-8"))?
        .trim();
    if text.is_empty() {
        return Err(MqttError::malformed(topic, "empty payload"));
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Encodes one field for its state topic.
///
/// Strings are sent bare so `heat` round-trips through [`parse_payload`];
/// everything else is JSON.
pub fn encode_field(value: &Value) -> MqttResult<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}
