//! Abstract historian API the engine fetches through

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::query::HistorianQuery;
use crate::schema::{
    Asset, AssetProperty, Event, EventType, EventTypeProperty, Measurement, PropertyType,
    QueryResult, TimeseriesDatabase,
};

/// Errors raised by a historian API implementation
///
/// The engine propagates these verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("historian responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::Decode(error.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFilter {
    /// Name keyword, or a `/regex/` pattern
    pub keyword: Option<String>,
    pub database_uuids: Vec<Uuid>,
    pub limit: Option<usize>,
}

/// Asset lookup; an empty UUID list returns every asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetFilter {
    pub uuids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetPropertyFilter {
    pub asset_uuids: Vec<Uuid>,
}

/// Event-type lookup; an empty UUID list returns every event type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTypeFilter {
    pub uuids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTypePropertyFilter {
    pub event_type_uuids: Vec<Uuid>,
    /// Restrict to these property types, empty for all
    pub types: Vec<PropertyType>,
}

/// Predicate on an event property value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventPropertyValueFilter {
    pub property: String,
    pub datatype: String,
    pub value: Value,
    pub operator: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub asset_uuids: Vec<Uuid>,
    pub event_type_uuids: Vec<Uuid>,
    pub statuses: Vec<String>,
    pub property_filter: Vec<EventPropertyValueFilter>,
    pub limit: Option<usize>,
    /// Ask the historian to embed property bags in the events
    pub preload_properties: bool,
}

/// Operations the engine needs from a historian service
#[async_trait::async_trait]
pub trait HistorianApi: Send + Sync {
    async fn fetch_measurements(&self, filter: &MeasurementFilter) -> Result<Vec<Measurement>, ApiError>;

    async fn fetch_measurement(&self, uuid: Uuid) -> Result<Measurement, ApiError>;

    async fn fetch_databases(&self) -> Result<Vec<TimeseriesDatabase>, ApiError>;

    async fn fetch_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, ApiError>;

    async fn fetch_asset_properties(&self, filter: &AssetPropertyFilter) -> Result<Vec<AssetProperty>, ApiError>;

    async fn fetch_event_types(&self, filter: &EventTypeFilter) -> Result<Vec<EventType>, ApiError>;

    async fn fetch_event_type_properties(
        &self,
        filter: &EventTypePropertyFilter,
    ) -> Result<Vec<EventTypeProperty>, ApiError>;

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<Event>, ApiError>;

    /// Run an aggregated or raw series query by measurement UUID
    async fn run_series_query(&self, query: &HistorianQuery) -> Result<QueryResult, ApiError>;

    /// Run query text verbatim against one time-series database
    async fn run_raw_query(&self, database: &str, query: &str) -> Result<QueryResult, ApiError>;

    /// Short name used in logs
    fn source_name(&self) -> &str;
}
