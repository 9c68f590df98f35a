//! Dynamic document value type.
//!
//! [`Value`] represents any JSON-compatible value a document body can hold,
//! plus binary [`crate::BlobRef`] attachments. Values are stored as CBOR in
//! the commit log and convert losslessly to and from `serde_json::Value`
//! (blob references surface in JSON as tagged objects).

use crate::blob::BlobRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key used when representing a blob reference in plain JSON.
const JSON_BLOB_TAG: &str = "@blob";

/// A dynamic document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Text string (UTF-8).
    String(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of string keys to values.
    Object(BTreeMap<String, Value>),
    /// Reference to a binary blob attachment.
    Blob(BlobRef),
}

impl Value {
    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, converting integers.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an object, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Get this value as a blob reference, if it is one.
    #[must_use]
    pub fn as_blob(&self) -> Option<&BlobRef> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Navigates a dotted property path (`"address.city"`).
    ///
    /// Numeric path segments index into arrays. Returns `None` when any
    /// segment is missing or the shape does not match.
    #[must_use]
    pub fn at_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Converts a `serde_json::Value` into a document value.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(blob) = BlobRef::from_json_tag(map) {
                    return Value::Blob(blob);
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts this value into a `serde_json::Value`.
    ///
    /// Blob references become `{"@blob": {...}}` tagged objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Blob(blob) => {
                let mut tagged = serde_json::Map::new();
                tagged.insert(JSON_BLOB_TAG.to_string(), blob.to_json());
                serde_json::Value::Object(tagged)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), Value::from("Lisbon"));
        address.insert("zip".to_string(), Value::from("1100"));

        let mut root = BTreeMap::new();
        root.insert("name".to_string(), Value::from("Alice"));
        root.insert("age".to_string(), Value::from(34));
        root.insert("address".to_string(), Value::Object(address));
        root.insert(
            "tags".to_string(),
            Value::from(vec!["a", "b"]),
        );
        Value::Object(root)
    }

    #[test]
    fn path_navigation() {
        let v = sample();
        assert_eq!(v.at_path("name").and_then(Value::as_str), Some("Alice"));
        assert_eq!(
            v.at_path("address.city").and_then(Value::as_str),
            Some("Lisbon")
        );
        assert_eq!(v.at_path("tags.1").and_then(Value::as_str), Some("b"));
        assert!(v.at_path("address.street").is_none());
        assert!(v.at_path("name.x").is_none());
    }

    #[test]
    fn int_coerces_to_float() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Bool(true).as_float(), None);
    }

    #[test]
    fn json_round_trip() {
        let v = sample();
        let json = v.to_json();
        assert_eq!(Value::from_json(&json), v);
    }

    #[test]
    fn json_number_classification() {
        let json: serde_json::Value = serde_json::json!({ "i": 7, "f": 1.5 });
        let v = Value::from_json(&json);
        assert_eq!(v.at_path("i"), Some(&Value::Int(7)));
        assert_eq!(v.at_path("f"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn cbor_round_trip() {
        let v = sample();
        let mut buf = Vec::new();
        ciborium::into_writer(&v, &mut buf).unwrap();
        let back: Value = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, v);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1e12f64..1e12).prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(Value::Object),
            ]
        })
    }

    proptest! {
        #[test]
        fn cbor_round_trips(v in value_strategy()) {
            let mut buf = Vec::new();
            ciborium::into_writer(&v, &mut buf).unwrap();
            let back: Value = ciborium::from_reader(buf.as_slice()).unwrap();
            prop_assert_eq!(back, v);
        }

        #[test]
        fn json_round_trips(v in value_strategy()) {
            let back = Value::from_json(&v.to_json());
            prop_assert_eq!(back, v);
        }
    }
}
