//! Webhook payloads

use serde::Serialize;
use serde_json::{Map, Value};

/// Flat key/value merge variables for one webhook push
///
/// On the wire the variables are wrapped as `{"merge_variables": {...}}`;
/// [`Payload::size`] measures that exact body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    variables: Map<String, Value>,
}

#[derive(Serialize)]
struct Body<'a> {
    merge_variables: &'a Map<String, Value>,
}

impl Payload {
    pub fn new(variables: Map<String, Value>) -> Self {
        Self { variables }
    }

    /// Build from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(variables) => Some(Self { variables }),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Serialized request body
    pub fn to_body(&self) -> Vec<u8> {
        // Serializing a map of JSON values cannot fail
        serde_json::to_vec(&Body {
            merge_variables: &self.variables,
        })
        .unwrap_or_default()
    }

    /// Size of the serialized request body in bytes
    pub fn size(&self) -> usize {
        self.to_body().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_wraps_merge_variables() {
        let mut payload = Payload::default();
        payload.insert("temp", 21.5);
        payload.insert("label", "Outside");

        let body: Value = serde_json::from_slice(&payload.to_body()).unwrap();
        assert_eq!(body, json!({"merge_variables": {"temp": 21.5, "label": "Outside"}}));
    }

    #[test]
    fn test_size_counts_utf8_bytes() {
        let mut payload = Payload::default();
        payload.insert("unit", "°F");
        // {"merge_variables":{"unit":"°F"}} with ° encoded as two bytes
        assert_eq!(payload.size(), r#"{"merge_variables":{"unit":"°F"}}"#.len());
        assert_eq!(payload.size(), 34);
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Payload::from_value(json!({"a": 1})).is_some());
        assert!(Payload::from_value(json!([1, 2])).is_none());
        assert!(Payload::from_value(json!("text")).is_none());
    }
}
