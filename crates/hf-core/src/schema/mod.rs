//! Historian domain schema
//!
//! All types deserialize from the historian's JSON wire form (PascalCase keys).

pub mod assets;
pub mod attributes;
pub mod events;
pub mod timeseries;

pub use assets::{Asset, AssetIndex, AssetProperty, ASSET_PATH_SEPARATOR};
pub use attributes::Attributes;
pub use events::{
    Event, EventProperties, EventType, EventTypeProperty, PeriodicPropertyValues, PeriodicSample,
    PropertyDatatype, PropertyType,
};
pub use timeseries::{
    DataPoint, Measurement, QueryResult, SampleValue, Series, TimeseriesDatabase,
};
