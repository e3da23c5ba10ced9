//! Messages exchanged between the HTTP layer and the transport channel.

use crate::key::ObjectKey;
use crate::object::{ObjectValue, StoredObject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A device long-poll: "give me anything newer than `since` for `keys`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollRequest {
    /// Device serial.
    pub serial: String,
    /// Keys the device subscribes to.
    pub keys: Vec<ObjectKey>,
    /// Last revision the device has seen per key. Missing keys count as 0.
    #[serde(default)]
    pub since: HashMap<ObjectKey, u64>,
    /// Requested idle timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl PollRequest {
    /// Creates a poll with no known revisions.
    pub fn new(serial: impl Into<String>, keys: Vec<ObjectKey>) -> Self {
        Self {
            serial: serial.into(),
            keys,
            since: HashMap::new(),
            timeout_ms: None,
        }
    }

    /// Records the last revision seen for a key.
    pub fn with_since(mut self, key: ObjectKey, revision: u64) -> Self {
        self.since.insert(key, revision);
        self
    }

    /// Sets the requested timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Last seen revision for a key.
    pub fn since_for(&self, key: &ObjectKey) -> u64 {
        self.since.get(key).copied().unwrap_or(0)
    }
}

/// Long-poll answer: either data or an empty timed-out response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    /// Objects newer than the device's revisions.
    #[serde(default)]
    pub results: BTreeMap<ObjectKey, StoredObject>,
    /// True if the poll idled out; the device should poll again.
    #[serde(default)]
    pub timed_out: bool,
}

impl PollResponse {
    /// Response carrying data.
    pub fn results(results: BTreeMap<ObjectKey, StoredObject>) -> Self {
        Self {
            results,
            timed_out: false,
        }
    }

    /// Empty-but-successful response.
    pub fn timed_out() -> Self {
        Self {
            results: BTreeMap::new(),
            timed_out: true,
        }
    }
}

/// A device write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    /// Device serial.
    pub serial: String,
    /// Target key.
    pub key: ObjectKey,
    /// Partial update.
    pub value: ObjectValue,
}

/// Result of a device write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    /// Revision after the write.
    pub revision: u64,
    /// Commit time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Pairing claim: push these keys to the device right away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Device serial that was claimed.
    pub serial: String,
    /// User, device, structure, link and alert dialog keys.
    pub object_keys: Vec<ObjectKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_defaults_to_zero() {
        let key = ObjectKey::device("ABC123").unwrap();
        let other = ObjectKey::shared("ABC123").unwrap();
        let request = PollRequest::new("ABC123", vec![key.clone(), other.clone()])
            .with_since(key.clone(), 5);

        assert_eq!(request.since_for(&key), 5);
        assert_eq!(request.since_for(&other), 0);
    }

    #[test]
    fn poll_request_from_json() {
        let json = r#"{
            "serial": "ABC123",
            "keys": ["device.ABC123", "shared.ABC123"],
            "since": {"device.ABC123": 5},
            "timeout_ms": 30000
        }"#;
        let request: PollRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.keys.len(), 2);
        assert_eq!(request.since_for(&ObjectKey::device("ABC123").unwrap()), 5);
        assert_eq!(request.timeout_ms, Some(30_000));
    }

    #[test]
    fn timed_out_response_is_empty() {
        let response = PollResponse::timed_out();
        assert!(response.timed_out);
        assert!(response.results.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["timed_out"], true);
    }
}
