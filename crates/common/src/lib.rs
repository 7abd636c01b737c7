//! ringkv-common: shared types for the ringkv project.
//!
//! Provides the polymorphic [`Value`] stored in every shard's table and
//! the wall-clock timestamp helper used when records are applied.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A stored value: either a raw UTF-8 string or a structured JSON
/// document (object or array).
///
/// The discrimination is preserved on round-trip through the engine. Only
/// parses that yield an object or array become [`Value::Json`]; numbers
/// and bare strings stay [`Value::Bytes`] to avoid lossy coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An opaque UTF-8 string.
    Bytes(String),
    /// A structured JSON document (object or array).
    Json(serde_json::Value),
}

impl Value {
    /// Classify a parsed JSON value. Objects and arrays keep their
    /// structure; scalars collapse to their string form.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => Value::Json(v),
            serde_json::Value::String(s) => Value::Bytes(s),
            other => Value::Bytes(other.to_string()),
        }
    }

    /// Reconstruct a value from its WAL byte encoding: best-effort JSON
    /// parse, structured only if the parse yields an object or array.
    pub fn from_wal_bytes(bytes: &[u8]) -> Self {
        if let Ok(v) = serde_json::from_slice::<serde_json::Value>(bytes) {
            if v.is_object() || v.is_array() {
                return Value::Json(v);
            }
        }
        Value::Bytes(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The byte encoding written to the WAL: the raw string for `Bytes`,
    /// the canonical JSON serialization for `Json`.
    pub fn to_wal_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bytes(s) => s.as_bytes().to_vec(),
            Value::Json(v) => serde_json::to_vec(v).unwrap_or_default(),
        }
    }

    /// The JSON representation returned to clients.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bytes(s) => serde_json::Value::String(s.clone()),
            Value::Json(v) => v.clone(),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Value::Json(_))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bytes(s) => serializer.serialize_str(s),
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(s) => write!(f, "{}", s),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch. Advisory only; not
/// monotonic across restarts.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object_stays_structured() {
        let v = Value::from_json(json!({"name": "Bob", "age": 30}));
        assert!(v.is_json());
    }

    #[test]
    fn test_from_json_array_stays_structured() {
        let v = Value::from_json(json!([1, 2, 3]));
        assert!(v.is_json());
    }

    #[test]
    fn test_from_json_scalars_collapse_to_bytes() {
        assert_eq!(Value::from_json(json!("hi")), Value::Bytes("hi".into()));
        assert_eq!(Value::from_json(json!(42)), Value::Bytes("42".into()));
        assert_eq!(Value::from_json(json!(true)), Value::Bytes("true".into()));
    }

    #[test]
    fn test_wal_roundtrip_string() {
        let v = Value::Bytes("Alice".into());
        let bytes = v.to_wal_bytes();
        assert_eq!(Value::from_wal_bytes(&bytes), v);
    }

    #[test]
    fn test_wal_roundtrip_structured() {
        let v = Value::Json(json!({"tags": ["a", "b"], "n": 1}));
        let bytes = v.to_wal_bytes();
        assert_eq!(Value::from_wal_bytes(&bytes), v);
    }

    #[test]
    fn test_wal_bytes_numeric_string_stays_bytes() {
        // "42" parses as JSON, but only objects/arrays become structured.
        let v = Value::from_wal_bytes(b"42");
        assert_eq!(v, Value::Bytes("42".into()));
    }

    #[test]
    fn test_serde_representation() {
        let v = Value::Json(json!([1, 2]));
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, "[1,2]");
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);

        let v = Value::Bytes("plain".into());
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, "\"plain\"");
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_now_ms_positive() {
        assert!(now_ms() > 0);
    }
}
