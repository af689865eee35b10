//! Reshaping of events into tables
//!
//! Simple queries produce one wide table per event type with one row per
//! event. Trend queries pivot periodic property values (and per-event
//! asset-property series) into a single `Result` table keyed by offset.

mod simple;
mod trend;

use std::collections::BTreeMap;

use ahash::AHashMap;
use chrono::{DateTime, SecondsFormat, Utc};
use hf_core::{AssetIndex, Event, EventType, EventTypeProperty, PropertyDatatype};
use uuid::Uuid;

use crate::table::{Table, ValueKind};

pub use simple::simple_event_tables;
pub use trend::trend_event_table;

pub const EVENT_UUID_COLUMN: &str = "EventUUID";
pub const PARENT_EVENT_UUID_COLUMN: &str = "ParentEventUUID";
pub const ASSET_UUID_COLUMN: &str = "AssetUUID";
pub const EVENT_TYPE_UUID_COLUMN: &str = "EventTypeUUID";
pub const ASSET_COLUMN: &str = "Asset";
pub const ASSET_PATH_COLUMN: &str = "AssetPath";
pub const EVENT_TYPE_COLUMN: &str = "EventType";
pub const START_TIME_COLUMN: &str = "StartTime";
pub const STOP_TIME_COLUMN: &str = "StopTime";
pub const DURATION_COLUMN: &str = "Duration";
pub const PROPERTY_LABEL: &str = "Property";
pub const OFFSET_COLUMN: &str = "Offset";
pub const PARENT_PREFIX: &str = "Parent_";

/// Name of the single table produced by trend queries
pub const TREND_TABLE_NAME: &str = "Result";

/// Everything the event reshaping needs for one query
pub struct EventFrameInput<'a> {
    pub events: &'a [Event],
    pub assets: &'a AssetIndex,
    event_types: BTreeMap<Uuid, &'a EventType>,
    properties_by_type: AHashMap<Uuid, Vec<&'a EventTypeProperty>>,
    /// Property allow-list by name or UUID; empty selects every property
    pub selected: &'a [String],
    pub include_parent_info: bool,
    /// Per-event asset-property tables keyed by event UUID
    pub side_tables: &'a BTreeMap<Uuid, Vec<Table>>,
}

impl<'a> EventFrameInput<'a> {
    pub fn new(
        events: &'a [Event],
        assets: &'a AssetIndex,
        event_types: &'a [EventType],
        properties: &'a [EventTypeProperty],
        side_tables: &'a BTreeMap<Uuid, Vec<Table>>,
    ) -> Self {
        let mut properties_by_type: AHashMap<Uuid, Vec<&EventTypeProperty>> = AHashMap::new();
        for property in properties {
            properties_by_type
                .entry(property.event_type_uuid)
                .or_default()
                .push(property);
        }

        Self {
            events,
            assets,
            event_types: event_types.iter().map(|t| (t.uuid, t)).collect(),
            properties_by_type,
            selected: &[],
            include_parent_info: false,
            side_tables,
        }
    }

    pub fn with_selected(mut self, selected: &'a [String]) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_parent_info(mut self, include: bool) -> Self {
        self.include_parent_info = include;
        self
    }

    fn event_type(&self, uuid: &Uuid) -> Option<&'a EventType> {
        self.event_types.get(uuid).copied()
    }

    fn event_type_name(&self, uuid: &Uuid) -> String {
        self.event_type(uuid).map(|t| t.name.clone()).unwrap_or_default()
    }

    /// Properties of an event type in fetch order
    fn properties_of(&self, event_type: &Uuid) -> &[&'a EventTypeProperty] {
        self.properties_by_type
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn asset_name(&self, uuid: &Uuid) -> String {
        self.assets.get(uuid).map(|a| a.name.clone()).unwrap_or_default()
    }

    fn asset_path(&self, uuid: &Uuid) -> String {
        self.assets.path(uuid).unwrap_or_default()
    }

    fn side_tables_of(&self, event: &Uuid) -> &'a [Table] {
        self.side_tables.get(event).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Column kind of an event-type property
fn property_kind(datatype: &PropertyDatatype) -> Option<ValueKind> {
    match datatype {
        PropertyDatatype::Bool => Some(ValueKind::Bool),
        PropertyDatatype::Number => Some(ValueKind::Float64),
        PropertyDatatype::String => Some(ValueKind::String),
        PropertyDatatype::Unknown => None,
    }
}

/// RFC 3339 with whole seconds
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Label text of a property value
fn label_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
