//! Typed cell values

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use hf_core::SampleValue;
use serde::{Deserialize, Serialize};

/// Element kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bool,
    Time,
    Bytes,
}

/// A concrete (non-null) cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
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
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int8(_) => ValueKind::Int8,
            Value::Int16(_) => ValueKind::Int16,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt8(_) => ValueKind::UInt8,
            Value::UInt16(_) => ValueKind::UInt16,
            Value::UInt32(_) => ValueKind::UInt32,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::String(_) => ValueKind::String,
            Value::Bool(_) => ValueKind::Bool,
            Value::Time(_) => ValueKind::Time,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Convert a raw sample; numeric strings become `Float64`
    ///
    /// Nulls, arrays and unparsable numeric strings yield `None`.
    pub fn from_sample(sample: &SampleValue) -> Option<Value> {
        Some(match sample {
            SampleValue::Null | SampleValue::Array(_) => return None,
            SampleValue::Int8(v) => Value::Int8(*v),
            SampleValue::Int16(v) => Value::Int16(*v),
            SampleValue::Int32(v) => Value::Int32(*v),
            SampleValue::Int64(v) => Value::Int64(*v),
            SampleValue::UInt8(v) => Value::UInt8(*v),
            SampleValue::UInt16(v) => Value::UInt16(*v),
            SampleValue::UInt32(v) => Value::UInt32(*v),
            SampleValue::UInt64(v) => Value::UInt64(*v),
            SampleValue::Float32(v) => Value::Float32(*v),
            SampleValue::Float64(v) => Value::Float64(*v),
            SampleValue::String(s) => Value::String(s.clone()),
            SampleValue::Bool(b) => Value::Bool(*b),
            SampleValue::Time(t) => Value::Time(*t),
            SampleValue::Bytes(b) => Value::Bytes(b.clone()),
            SampleValue::Number(s) => Value::Float64(s.trim().parse().ok()?),
        })
    }

    /// Kind a sample resolves to, `None` for samples that carry no value
    pub fn sample_kind(sample: &SampleValue) -> Option<ValueKind> {
        match sample {
            SampleValue::Number(_) => Some(ValueKind::Float64),
            other => Value::from_sample(other).map(|v| v.kind()),
        }
    }

    /// Coerce a JSON property value into a column of `kind`
    ///
    /// Values of another JSON type yield `None`.
    pub fn from_json(value: &serde_json::Value, kind: ValueKind) -> Option<Value> {
        match (kind, value) {
            (ValueKind::Float64, serde_json::Value::Number(n)) => n.as_f64().map(Value::Float64),
            (ValueKind::Bool, serde_json::Value::Bool(b)) => Some(Value::Bool(*b)),
            (ValueKind::String, serde_json::Value::String(s)) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    /// Text rendering of any JSON value, strings unquoted
    pub fn json_to_string(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int8(v) => Some(*v as f64),
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::UInt8(v) => Some(*v as f64),
            Value::UInt16(v) => Some(*v as f64),
            Value::UInt32(v) => Some(*v as f64),
            Value::UInt64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Time(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Bytes(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}
