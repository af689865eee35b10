//! Frame model and reshaping stages for historian query results
//!
//! A [`Table`] is an ordered set of named, typed, equal-length columns plus
//! identity metadata. The modules below turn raw series and events into
//! tables and post-process them.

pub mod changes;
pub mod events;
pub mod fill;
pub mod merge;
pub mod naming;
pub mod series;
pub mod table;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-exports
pub use changes::keep_changes_only;
pub use fill::{delete_leading_points, fill_initial_empty_values};
pub use merge::{dedupe_by_identity, merge_tables};
pub use naming::NamingOptions;
pub use series::SeriesFrameBuilder;
pub use table::{
    Column, FieldConfig, Labels, Table, TableIdentity, TableMeta, Threshold, Thresholds, Value,
    ValueKind, DURATION_UNIT, TIME_COLUMN, VALUE_COLUMN,
};

/// Errors that can occur in table operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column {column} has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Row has {actual} values, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}
