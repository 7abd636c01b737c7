//! Stored record format.

use ringkv_common::{now_ms, Value};
use serde::{Deserialize, Serialize};

/// A record held in the table and serialized into snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// The stored value (raw string or structured JSON).
    pub value: Value,
    /// Wall-clock timestamp (millis since epoch), assigned at apply time.
    pub ts: u64,
}

impl Record {
    /// Create a record stamped with the current wall clock.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            ts: now_ms(),
        }
    }

    pub fn with_ts(value: Value, ts: u64) -> Self {
        Self { value, ts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_has_timestamp() {
        let r = Record::new(Value::Bytes("v".into()));
        assert!(r.ts > 0);
    }

    #[test]
    fn test_record_snapshot_shape() {
        // Snapshot JSON keeps the value in its natural JSON form.
        let r = Record::with_ts(Value::Json(json!({"a": 1})), 123);
        let s = serde_json::to_string(&r).unwrap();
        assert_eq!(s, r#"{"value":{"a":1},"ts":123}"#);

        let r = Record::with_ts(Value::Bytes("Alice".into()), 5);
        let s = serde_json::to_string(&r).unwrap();
        assert_eq!(s, r#"{"value":"Alice","ts":5}"#);
    }

    #[test]
    fn test_record_roundtrip() {
        let r = Record::with_ts(Value::Json(json!(["x", "y"])), 99);
        let s = serde_json::to_string(&r).unwrap();
        let back: Record = serde_json::from_str(&s).unwrap();
        assert_eq!(back, r);
    }
}
