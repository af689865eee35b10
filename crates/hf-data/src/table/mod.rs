//! Table ("frame") model

mod config;
mod export;
mod value;

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DataError;

pub use config::{FieldConfig, Threshold, Thresholds, ThresholdsMode, DURATION_UNIT};
pub use value::{Value, ValueKind};

/// Name of the timestamp column of series tables
pub const TIME_COLUMN: &str = "time";

/// Name of the single value column of series tables
pub const VALUE_COLUMN: &str = "value";

/// Ordered labels attached to tables and columns
pub type Labels = BTreeMap<String, String>;

/// A named, typed, nullable column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub labels: Labels,
    pub config: Option<FieldConfig>,
    kind: ValueKind,
    values: Vec<Option<Value>>,
}

impl Column {
    /// Create a new empty column
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            config: None,
            kind,
            values: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_config(mut self, config: FieldConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build a column from values, nulling those of another kind
    pub fn from_values(
        name: impl Into<String>,
        kind: ValueKind,
        values: impl IntoIterator<Item = Option<Value>>,
    ) -> Self {
        let mut column = Self::new(name, kind);
        for value in values {
            column.push(value);
        }
        column
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value; a value of another kind is stored as null
    pub fn push(&mut self, value: Option<Value>) {
        let value = value.filter(|v| v.kind() == self.kind);
        self.values.push(value);
    }

    /// Concrete value at a row
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row).and_then(Option::as_ref)
    }

    pub fn set(&mut self, row: usize, value: Option<Value>) {
        let value = value.filter(|v| v.kind() == self.kind);
        if let Some(slot) = self.values.get_mut(row) {
            *slot = value;
        }
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    fn remove(&mut self, row: usize) {
        if row < self.values.len() {
            self.values.remove(row);
        }
    }

    /// Display name from the config, if one was set
    pub fn display_name(&self) -> Option<&str> {
        self.config.as_ref()?.display_name.as_deref()
    }

    pub fn config_mut(&mut self) -> &mut FieldConfig {
        self.config.get_or_insert_with(FieldConfig::default)
    }
}

/// Identity fields a table carries from its source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableMeta {
    #[serde(rename = "MeasurementUUID", skip_serializing_if = "Option::is_none")]
    pub measurement_uuid: Option<Uuid>,
    #[serde(rename = "Measurement")]
    pub measurement_name: String,
    #[serde(rename = "DatabaseUUID", skip_serializing_if = "Option::is_none")]
    pub database_uuid: Option<Uuid>,
    #[serde(rename = "Database")]
    pub database_name: String,
    #[serde(rename = "AssetUUID", skip_serializing_if = "Option::is_none")]
    pub asset_uuid: Option<Uuid>,
    pub asset_path: String,
    #[serde(rename = "Asset")]
    pub asset_name: String,
    #[serde(rename = "AssetPropertyUUID", skip_serializing_if = "Option::is_none")]
    pub asset_property_uuid: Option<Uuid>,
    pub asset_property: String,
    pub description: String,
    pub labels: Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<String>,
    /// First row is a last known point from before the query window
    #[serde(skip)]
    pub leading_point: bool,
}

/// Key matching tables that describe the same series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableIdentity {
    source: String,
    labels: String,
}

impl TableIdentity {
    pub fn from_meta(meta: &TableMeta) -> Self {
        let source = match meta.measurement_uuid {
            Some(uuid) => uuid.to_string(),
            None => meta.measurement_name.clone(),
        };
        Self {
            source,
            labels: render_labels(&meta.labels),
        }
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.source, self.labels)
    }
}

/// Canonical `k=v` rendering of a label set, sorted by key
pub fn render_labels(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered set of equal-length columns with identity metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub meta: TableMeta,
    columns: IndexMap<String, Column>,
}

impl Table {
    /// Create a new table without columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: TableMeta::default(),
            columns: IndexMap::new(),
        }
    }

    /// Create a table from columns that must share one length
    pub fn with_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, DataError> {
        let mut table = Self::new(name);
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    pub fn add_column(&mut self, column: Column) -> Result<(), DataError> {
        self.insert_column(self.columns.len(), column)
    }

    /// Insert a column at a position
    pub fn insert_column(&mut self, index: usize, column: Column) -> Result<(), DataError> {
        if self.columns.contains_key(&column.name) {
            return Err(DataError::DuplicateColumn(column.name));
        }
        let actual = column.len();
        if !self.columns.is_empty() && actual != self.row_count() {
            return Err(DataError::LengthMismatch {
                column: column.name,
                expected: self.row_count(),
                actual,
            });
        }
        let index = index.min(self.columns.len());
        self.columns.shift_insert(index, column.name.clone(), column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.get_mut(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.values_mut()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn time_column(&self) -> Option<&Column> {
        self.column(TIME_COLUMN)
    }

    pub fn value_column(&self) -> Option<&Column> {
        self.column(VALUE_COLUMN)
    }

    pub fn value_column_mut(&mut self) -> Option<&mut Column> {
        self.column_mut(VALUE_COLUMN)
    }

    /// Element kinds in column order
    pub fn kinds(&self) -> Vec<ValueKind> {
        self.columns.values().map(Column::kind).collect()
    }

    pub fn identity(&self) -> TableIdentity {
        TableIdentity::from_meta(&self.meta)
    }

    /// Append one row, one value per column in column order
    pub fn append_row(&mut self, row: Vec<Option<Value>>) -> Result<(), DataError> {
        if row.len() != self.columns.len() {
            return Err(DataError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (column, value) in self.columns.values_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Values of one row in column order
    pub fn row(&self, index: usize) -> Vec<Option<Value>> {
        self.columns
            .values()
            .map(|c| c.get(index).cloned())
            .collect()
    }

    /// Append every row of `other`, matching columns by position
    pub fn extend_rows(&mut self, other: &Table) -> Result<(), DataError> {
        for index in 0..other.row_count() {
            self.append_row(other.row(index))?;
        }
        Ok(())
    }

    pub fn delete_row(&mut self, index: usize) {
        for column in self.columns.values_mut() {
            column.remove(index);
        }
    }

    /// Columns other than the time column
    pub fn data_columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns
            .values_mut()
            .filter(|c| c.name != TIME_COLUMN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::with_columns(
            "temp",
            vec![
                Column::from_values(TIME_COLUMN, ValueKind::Int64, vec![Some(Value::Int64(1))]),
                Column::from_values(VALUE_COLUMN, ValueKind::Float64, vec![Some(Value::Float64(2.0))]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_push_nulls_mismatched_kind() {
        let mut column = Column::new("value", ValueKind::Float64);
        column.push(Some(Value::Float64(1.0)));
        column.push(Some(Value::String("x".into())));
        column.push(None);

        assert_eq!(column.values(), &[Some(Value::Float64(1.0)), None, None]);
    }

    #[test]
    fn test_table_shape_checks() {
        let mut table = sample_table();
        assert!(matches!(
            table.add_column(Column::new(VALUE_COLUMN, ValueKind::Bool)),
            Err(DataError::DuplicateColumn(_))
        ));
        match table.add_column(Column::new("other", ValueKind::Bool)) {
            Err(DataError::LengthMismatch { column, expected, actual }) => {
                assert_eq!((column.as_str(), expected, actual), ("other", 1, 0));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            table.append_row(vec![None]),
            Err(DataError::RowWidth { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_rows_and_delete() {
        let mut table = sample_table();
        table
            .append_row(vec![Some(Value::Int64(2)), Some(Value::Float64(3.0))])
            .unwrap();
        assert_eq!(table.row_count(), 2);

        table.delete_row(0);
        assert_eq!(table.row(0), vec![Some(Value::Int64(2)), Some(Value::Float64(3.0))]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_insert_column_position() {
        let mut table = sample_table();
        table
            .insert_column(0, Column::from_values("first", ValueKind::Bool, vec![None]))
            .unwrap();
        assert_eq!(table.column_names(), vec!["first", TIME_COLUMN, VALUE_COLUMN]);
    }

    #[test]
    fn test_identity_sorts_labels() {
        let mut a = Table::new("a");
        a.meta.measurement_name = "temp".into();
        a.meta.labels.insert("z".into(), "1".into());
        a.meta.labels.insert("a".into(), "2".into());

        assert_eq!(a.identity().to_string(), "temp{a=2,z=1}");
    }
}
