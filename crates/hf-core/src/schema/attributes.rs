//! Loosely typed attribute bags carried by measurements and events

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// JSON object with lenient typed getters
///
/// A `null` on the wire decodes to an empty bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Attributes(pub Map<String, Value>);

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Option::<Map<String, Value>>::deserialize(deserializer)?;
        Ok(Self(map.unwrap_or_default()))
    }
}

impl Attributes {
    /// Create an empty attribute bag
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw JSON value for a key, `None` for missing or null entries
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_raw(key).and_then(Value::as_str)
    }

    /// Float value for a key, accepting JSON numbers and numeric strings
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get_raw(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Nested attribute bag for a key
    pub fn get_attributes(&self, key: &str) -> Option<Attributes> {
        match self.get_raw(key)? {
            Value::Object(map) => Some(Attributes(map.clone())),
            _ => None,
        }
    }

    /// Decode the value for a key into any deserializable type
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_raw(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_getters() {
        let attrs: Attributes = serde_json::from_value(json!({
            "UoM": "degC",
            "LimitLo": "12.5",
            "LimitHi": 80,
            "Config": {"ValueMin": 0},
            "Missing": null
        }))
        .unwrap();

        assert_eq!(attrs.get_str("UoM"), Some("degC"));
        assert_eq!(attrs.get_f64("LimitLo"), Some(12.5));
        assert_eq!(attrs.get_f64("LimitHi"), Some(80.0));
        assert_eq!(attrs.get_f64("Missing"), None);
        assert_eq!(
            attrs.get_attributes("Config").and_then(|c| c.get_f64("ValueMin")),
            Some(0.0)
        );
        assert_eq!(attrs.get::<u32>("LimitHi"), Some(80));
    }

    #[test]
    fn test_null_decodes_to_empty() {
        let attrs: Attributes = serde_json::from_value(Value::Null).unwrap();
        assert!(attrs.is_empty());
    }
}
