//! Core types for the historian frame engine
//!
//! This crate holds the domain schema returned by a historian service, the
//! query descriptors understood by the engine, the engine configuration and
//! the abstract API the engine fetches through.

pub mod api;
pub mod config;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use api::{
    ApiError, AssetFilter, AssetPropertyFilter, EventFilter, EventPropertyValueFilter,
    EventTypeFilter, EventTypePropertyFilter, HistorianApi, MeasurementFilter,
};
pub use config::{ConfigError, EngineConfig};
pub use query::{
    Aggregation, AssetMeasurementQuery, EventQuery, EventQueryType, HistorianQuery,
    MeasurementQuery, QueryOptions, RawQuery, TimeRange,
};
pub use schema::{
    Asset, AssetIndex, AssetProperty, Attributes, DataPoint, Event, EventProperties, EventType,
    EventTypeProperty, Measurement, PeriodicPropertyValues, PeriodicSample, PropertyDatatype,
    PropertyType, QueryResult, SampleValue, Series, TimeseriesDatabase, ASSET_PATH_SEPARATOR,
};
