//! Events, event types and their properties

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::attributes::Attributes;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventType {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub description: String,
    #[serde(rename = "ParentUUID")]
    pub parent_uuid: Option<Uuid>,
}

/// How a property stores its values on an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    /// One value per event
    #[default]
    Simple,
    /// Sparse map from seconds since event start to value
    Periodic,
    /// Periodic values that also carry a dimension value per offset
    PeriodicWithDimension,
}

impl PropertyType {
    pub fn is_periodic(self) -> bool {
        !matches!(self, PropertyType::Simple)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyDatatype {
    Bool,
    Number,
    #[default]
    String,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventTypeProperty {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    #[serde(rename = "EventTypeUUID")]
    pub event_type_uuid: Uuid,
    #[serde(rename = "Type")]
    pub property_type: PropertyType,
    pub datatype: PropertyDatatype,
    #[serde(rename = "UoM")]
    pub uom: String,
}

impl EventTypeProperty {
    /// True when the property is named in `selected` by name or UUID, or
    /// when no selection was made
    pub fn is_selected<S: AsRef<str>>(&self, selected: &[S]) -> bool {
        if selected.is_empty() {
            return true;
        }
        let uuid = self.uuid.to_string();
        selected
            .iter()
            .any(|s| s.as_ref() == self.name || s.as_ref() == uuid)
    }
}

/// Property bag of an event as stored by the historian
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventProperties {
    pub properties: Attributes,
    #[serde(rename = "EventUUID")]
    pub event_uuid: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Event {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    #[serde(rename = "AssetUUID")]
    pub asset_uuid: Uuid,
    #[serde(rename = "EventTypeUUID")]
    pub event_type_uuid: Uuid,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    #[serde(rename = "ParentUUID")]
    pub parent_uuid: Option<Uuid>,
    /// Parent event, preloaded one level deep
    pub parent: Option<Box<Event>>,
    pub status: String,
    pub properties: Option<EventProperties>,
}

impl Event {
    /// Property value by name, `None` when absent or null
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.as_ref()?.properties.get_raw(name)
    }

    pub fn has_properties(&self) -> bool {
        self.properties
            .as_ref()
            .map_or(false, |p| !p.properties.is_empty())
    }

    /// Event duration in seconds, `None` while the event is open
    pub fn duration_secs(&self) -> Option<f64> {
        self.stop_time
            .map(|stop| (stop - self.start_time).num_milliseconds() as f64 / 1000.0)
    }

    /// Periodic values stored under a property name
    pub fn periodic_values(&self, name: &str) -> Option<PeriodicPropertyValues> {
        PeriodicPropertyValues::from_json(self.property(name)?)
    }
}

/// One sample of a periodic property
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicSample {
    /// Seconds since the event started
    pub offset: f64,
    pub value: Value,
    pub dimension: Option<Value>,
}

/// Sparse offset-to-value map of a periodic property
///
/// Wire form: `{"t": [offsets], "v": [values], "d": [dimension values]}`
/// where `d` is only present for properties with a dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PeriodicWire", into = "PeriodicWire")]
pub struct PeriodicPropertyValues {
    samples: Vec<PeriodicSample>,
    with_dimension: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PeriodicWire {
    #[serde(default)]
    t: Vec<f64>,
    #[serde(default)]
    v: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<Vec<Value>>,
}

impl From<PeriodicWire> for PeriodicPropertyValues {
    fn from(wire: PeriodicWire) -> Self {
        let mut values = PeriodicPropertyValues {
            samples: Vec::with_capacity(wire.t.len()),
            with_dimension: wire.d.is_some(),
        };
        for (i, offset) in wire.t.iter().enumerate() {
            let value = wire.v.get(i).cloned().unwrap_or(Value::Null);
            let dimension = wire.d.as_ref().and_then(|d| d.get(i).cloned());
            values.insert(*offset, value, dimension);
        }
        values
    }
}

impl From<PeriodicPropertyValues> for PeriodicWire {
    fn from(values: PeriodicPropertyValues) -> Self {
        let with_dimension = values.with_dimension;
        let mut wire = PeriodicWire {
            d: with_dimension.then(Vec::new),
            ..Default::default()
        };
        for sample in values.samples {
            wire.t.push(sample.offset);
            wire.v.push(sample.value);
            if let Some(d) = wire.d.as_mut() {
                d.push(sample.dimension.unwrap_or(Value::Null));
            }
        }
        wire
    }
}

impl PeriodicPropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension() -> Self {
        Self {
            with_dimension: true,
            ..Default::default()
        }
    }

    /// Decode from a property value, accepting the JSON object or its
    /// string encoding
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            Value::String(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    /// Set the value at an offset, replacing any earlier sample there
    pub fn insert(&mut self, offset: f64, value: Value, dimension: Option<Value>) {
        let sample = PeriodicSample {
            offset,
            value,
            dimension,
        };
        match self
            .samples
            .binary_search_by(|s| s.offset.total_cmp(&offset))
        {
            Ok(i) => self.samples[i] = sample,
            Err(i) => self.samples.insert(i, sample),
        }
    }

    pub fn has_dimension_values(&self) -> bool {
        self.with_dimension
    }

    /// Samples in ascending offset order
    pub fn samples(&self) -> &[PeriodicSample] {
        &self.samples
    }

    pub fn value_at(&self, offset: f64) -> Option<&Value> {
        self.samples
            .binary_search_by(|s| s.offset.total_cmp(&offset))
            .ok()
            .map(|i| &self.samples[i].value)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_periodic_values_from_wire() {
        let values = PeriodicPropertyValues::from_json(&json!({
            "t": [10.0, 0.0, 5.0],
            "v": [3, 1, 2]
        }))
        .unwrap();

        let offsets: Vec<f64> = values.samples().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0.0, 5.0, 10.0]);
        assert_eq!(values.value_at(5.0), Some(&json!(2)));
        assert!(!values.has_dimension_values());
    }

    #[test]
    fn test_periodic_values_with_dimension() {
        let encoded = json!({"t": [0, 1], "v": [true, false], "d": [100.5, 200]}).to_string();
        let values = PeriodicPropertyValues::from_json(&Value::String(encoded)).unwrap();

        assert!(values.has_dimension_values());
        assert_eq!(values.samples()[1].dimension, Some(json!(200)));

        let back = serde_json::to_value(&values).unwrap();
        assert_eq!(back["d"], json!([100.5, 200]));
    }

    #[test]
    fn test_event_helpers() {
        let event: Event = serde_json::from_value(json!({
            "UUID": "0b7f7a0c-30a7-4a4b-8a52-1f8e3c2b7d10",
            "StartTime": "2024-01-01T00:00:00Z",
            "StopTime": "2024-01-01T00:01:30Z",
            "Properties": {"Properties": {"Grade": "A", "Empty": null}}
        }))
        .unwrap();

        assert_eq!(event.duration_secs(), Some(90.0));
        assert_eq!(event.property("Grade"), Some(&json!("A")));
        assert_eq!(event.property("Empty"), None);
        assert!(event.has_properties());
    }

    #[test]
    fn test_property_selection() {
        let property = EventTypeProperty {
            name: "Grade".into(),
            ..Default::default()
        };
        let uuid = property.uuid.to_string();

        assert!(property.is_selected::<String>(&[]));
        assert!(property.is_selected(&["Grade"]));
        assert!(property.is_selected(&[uuid.as_str()]));
        assert!(!property.is_selected(&["Other"]));
    }
}
