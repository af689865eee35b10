//! Query dispatch over a historian API
//!
//! A [`QueryDispatcher`] decodes panel queries, resolves the measurements,
//! assets and event types they name, fetches through a [`HistorianApi`]
//! and runs the reshaping stages of `hf-data` on the results.
//!
//! [`HistorianApi`]: hf_core::HistorianApi

pub mod assets;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod filters;
pub mod fixture;
pub mod measurement;
pub mod raw;

use hf_core::ApiError;
use hf_data::DataError;
use thiserror::Error;

// Re-exports
pub use context::{CancelScope, QueryContext};
pub use dispatcher::{DataQuery, QueryDispatcher, QueryKind};
pub use fixture::{Fixture, FixtureApi};

/// Errors that can occur while running a query
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no aggregation specified")]
    MissingAggregation,

    #[error("unsupported query type {0}")]
    UnsupportedQueryType(String),

    #[error("unsupported event query type {0}")]
    UnsupportedEventQueryType(String),

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] serde_json::Error),

    #[error("query cancelled")]
    Cancelled,

    #[error("query task failed: {0}")]
    Task(String),
}

impl QueryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }
}
