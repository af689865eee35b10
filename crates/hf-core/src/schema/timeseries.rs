//! Time-series results and measurement metadata

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use super::attributes::Attributes;

/// A single sample as returned by the historian
///
/// JSON numbers decode to `Float64`, except integers beyond the exact range
/// of `f64`, which keep their text as `Number`. Arrays decode to `Array` for
/// multi-field points. The integer and narrower variants exist for callers
/// that build series in memory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum SampleValue {
    #[default]
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bool(bool),
    Time(DateTime<Utc>),
    Bytes(Vec<u8>),
    /// Number kept in its textual encoding
    Number(String),
    Array(Vec<SampleValue>),
}

impl SampleValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SampleValue::Null)
    }
}

/// Largest integer magnitude an `f64` holds exactly
const MAX_EXACT_INTEGER: u64 = 1 << 53;

fn is_exact_f64(n: &Number) -> bool {
    match (n.as_i64(), n.as_u64()) {
        (Some(i), _) => i.unsigned_abs() <= MAX_EXACT_INTEGER,
        (None, Some(u)) => u <= MAX_EXACT_INTEGER,
        (None, None) => true,
    }
}

impl From<Value> for SampleValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SampleValue::Null,
            Value::Bool(b) => SampleValue::Bool(b),
            Value::Number(n) if is_exact_f64(&n) => {
                n.as_f64().map(SampleValue::Float64).unwrap_or(SampleValue::Null)
            }
            Value::Number(n) => SampleValue::Number(n.to_string()),
            Value::String(s) => SampleValue::String(s),
            Value::Array(items) => {
                SampleValue::Array(items.into_iter().map(SampleValue::from).collect())
            }
            Value::Object(_) => SampleValue::String(value.to_string()),
        }
    }
}

impl From<SampleValue> for Value {
    fn from(value: SampleValue) -> Self {
        match value {
            SampleValue::Null => Value::Null,
            SampleValue::Int8(v) => Value::from(v),
            SampleValue::Int16(v) => Value::from(v),
            SampleValue::Int32(v) => Value::from(v),
            SampleValue::Int64(v) => Value::from(v),
            SampleValue::UInt8(v) => Value::from(v),
            SampleValue::UInt16(v) => Value::from(v),
            SampleValue::UInt32(v) => Value::from(v),
            SampleValue::UInt64(v) => Value::from(v),
            SampleValue::Float32(v) => Number::from_f64(v as f64).map_or(Value::Null, Value::Number),
            SampleValue::Float64(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
            SampleValue::String(s) => Value::String(s),
            SampleValue::Bool(b) => Value::Bool(b),
            SampleValue::Time(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            SampleValue::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
            SampleValue::Number(s) => s
                .parse::<Number>()
                .map(Value::Number)
                .unwrap_or(Value::String(s)),
            SampleValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

/// One sample of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPoint {
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub value: SampleValue,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: SampleValue) -> Self {
        Self { timestamp, value }
    }
}

/// One raw named time series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Series {
    pub measurement: String,
    pub database: String,
    /// Field names, present when each point carries an array of values
    pub fields: Vec<String>,
    pub tags: BTreeMap<String, Value>,
    pub data_points: Vec<DataPoint>,
    pub datatype: String,
}

impl Series {
    pub fn is_multi_field(&self) -> bool {
        !self.fields.is_empty()
    }
}

/// Result of a series or raw query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryResult {
    pub series: Vec<Series>,
    /// Provenance string of the query the historian executed
    pub executed_query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimeseriesDatabase {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub description: String,
}

/// Measurement metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Measurement {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub description: String,
    pub datatype: String,
    pub status: String,
    #[serde(rename = "DatabaseUUID")]
    pub database_uuid: Option<Uuid>,
    pub database: Option<TimeseriesDatabase>,
    pub attributes: Attributes,
    #[serde(rename = "UoM")]
    pub uom: String,
}

impl Measurement {
    /// Name of the owning database, when it was preloaded
    pub fn database_name(&self) -> Option<&str> {
        self.database
            .as_ref()
            .map(|db| db.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Engineering specification bag (`Config` attribute)
    pub fn engineering_specs(&self) -> Option<Attributes> {
        self.attributes.get_attributes("Config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_series_from_wire() {
        let series: Series = serde_json::from_value(json!({
            "Measurement": "temp",
            "Database": "influx",
            "Tags": {"status": "good", "quality": 192},
            "DataPoints": [
                {"Timestamp": 1000, "Value": 1},
                {"Timestamp": 2000, "Value": 2.5},
                {"Timestamp": 3000, "Value": null},
                {"Timestamp": 4000, "Value": [1, "a"]}
            ],
            "Datatype": "number"
        }))
        .unwrap();

        assert_eq!(series.measurement, "temp");
        assert!(!series.is_multi_field());
        let values: Vec<_> = series.data_points.iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                SampleValue::Float64(1.0),
                SampleValue::Float64(2.5),
                SampleValue::Null,
                SampleValue::Array(vec![SampleValue::Float64(1.0), SampleValue::String("a".into())]),
            ]
        );
    }

    #[test]
    fn test_wide_integers_keep_their_text() {
        let decode = |value: Value| serde_json::from_value::<SampleValue>(value).unwrap();
        assert_eq!(decode(json!(9007199254740992_u64)), SampleValue::Float64(9007199254740992.0));
        assert_eq!(decode(json!(9007199254740993_u64)), SampleValue::Number("9007199254740993".into()));
        assert_eq!(decode(json!(-9007199254740993_i64)), SampleValue::Number("-9007199254740993".into()));
        assert_eq!(
            Value::from(decode(json!(18446744073709551615_u64))),
            json!(18446744073709551615_u64)
        );
    }

    #[test]
    fn test_sample_value_to_json() {
        assert_eq!(Value::from(SampleValue::Number("12.5".into())), json!(12.5));
        assert_eq!(Value::from(SampleValue::Number("abc".into())), json!("abc"));
        assert_eq!(Value::from(SampleValue::Float64(f64::NAN)), Value::Null);
    }

    #[test]
    fn test_measurement_specs() {
        let measurement: Measurement = serde_json::from_value(json!({
            "Name": "temp",
            "UUID": "2b8cf1cc-6df1-4a2f-a6b2-8b0c1f25ec01",
            "Database": {"Name": "influx", "UUID": "6c2b6c1e-3cb4-4bd6-9a4c-12a5f4f9b0a1"},
            "Attributes": {"Config": {"UoM": "degC"}}
        }))
        .unwrap();

        assert_eq!(measurement.database_name(), Some("influx"));
        assert_eq!(
            measurement.engineering_specs().and_then(|c| c.get_str("UoM").map(String::from)),
            Some("degC".to_string())
        );
    }
}
