//! Arrow export of tables

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, StringArray, TimestampMillisecondArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use super::{Column, Table, Value, ValueKind};
use crate::DataError;

impl ValueKind {
    /// Arrow type used for columns of this kind
    pub fn data_type(self) -> DataType {
        match self {
            ValueKind::Int8 => DataType::Int8,
            ValueKind::Int16 => DataType::Int16,
            ValueKind::Int32 => DataType::Int32,
            ValueKind::Int64 => DataType::Int64,
            ValueKind::UInt8 => DataType::UInt8,
            ValueKind::UInt16 => DataType::UInt16,
            ValueKind::UInt32 => DataType::UInt32,
            ValueKind::UInt64 => DataType::UInt64,
            ValueKind::Float32 => DataType::Float32,
            ValueKind::Float64 => DataType::Float64,
            ValueKind::String => DataType::Utf8,
            ValueKind::Bool => DataType::Boolean,
            ValueKind::Time => DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            ValueKind::Bytes => DataType::Binary,
        }
    }
}

macro_rules! primitive_array {
    ($column:expr, $array:ty, $variant:ident) => {
        Arc::new(<$array>::from(
            $column
                .values()
                .iter()
                .map(|v| match v {
                    Some(Value::$variant(x)) => Some(*x),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )) as ArrayRef
    };
}

fn column_array(column: &Column) -> ArrayRef {
    match column.kind() {
        ValueKind::Int8 => primitive_array!(column, Int8Array, Int8),
        ValueKind::Int16 => primitive_array!(column, Int16Array, Int16),
        ValueKind::Int32 => primitive_array!(column, Int32Array, Int32),
        ValueKind::Int64 => primitive_array!(column, Int64Array, Int64),
        ValueKind::UInt8 => primitive_array!(column, UInt8Array, UInt8),
        ValueKind::UInt16 => primitive_array!(column, UInt16Array, UInt16),
        ValueKind::UInt32 => primitive_array!(column, UInt32Array, UInt32),
        ValueKind::UInt64 => primitive_array!(column, UInt64Array, UInt64),
        ValueKind::Float32 => primitive_array!(column, Float32Array, Float32),
        ValueKind::Float64 => primitive_array!(column, Float64Array, Float64),
        ValueKind::Bool => primitive_array!(column, BooleanArray, Bool),
        ValueKind::String => {
            let values: Vec<Option<&str>> = column.values().iter().map(|v| v.as_ref().and_then(Value::as_str)).collect();
            Arc::new(StringArray::from(values))
        }
        ValueKind::Time => {
            let values: Vec<Option<i64>> = column
                .values()
                .iter()
                .map(|v| v.as_ref().and_then(Value::as_time).map(|t| t.timestamp_millis()))
                .collect();
            Arc::new(TimestampMillisecondArray::from(values).with_timezone("UTC"))
        }
        ValueKind::Bytes => {
            let values: Vec<Option<&[u8]>> = column
                .values()
                .iter()
                .map(|v| match v {
                    Some(Value::Bytes(b)) => Some(b.as_slice()),
                    _ => None,
                })
                .collect();
            Arc::new(BinaryArray::from(values))
        }
    }
}

fn column_field(column: &Column) -> Result<Field, DataError> {
    let mut metadata = HashMap::new();
    if !column.labels.is_empty() {
        metadata.insert("labels".to_string(), serde_json::to_string(&column.labels)?);
    }
    if let Some(config) = &column.config {
        metadata.insert("config".to_string(), serde_json::to_string(config)?);
    }
    Ok(Field::new(&column.name, column.kind().data_type(), true).with_metadata(metadata))
}

impl Table {
    /// Arrow schema with labels, field config and table metadata attached
    pub fn schema(&self) -> Result<Schema, DataError> {
        let fields = self
            .columns()
            .map(column_field)
            .collect::<Result<Vec<_>, _>>()?;

        let mut metadata = HashMap::new();
        metadata.insert("name".to_string(), self.name.clone());
        metadata.insert("meta".to_string(), serde_json::to_string(&self.meta)?);
        Ok(Schema::new_with_metadata(fields, metadata))
    }

    /// Convert to an Arrow record batch
    pub fn to_record_batch(&self) -> Result<RecordBatch, DataError> {
        let schema = Arc::new(self.schema()?);
        let arrays: Vec<ArrayRef> = self.columns().map(column_array).collect();
        let options = RecordBatchOptions::new().with_row_count(Some(self.row_count()));
        Ok(RecordBatch::try_new_with_options(schema, arrays, &options)?)
    }
}
