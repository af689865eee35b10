//! Query descriptors and options understood by the engine

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::EventPropertyValueFilter;

/// Placeholder for the panel interval inside an aggregation period
pub const INTERVAL_VARIABLE: &str = "$__interval";

/// Half-open query window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

/// Aggregation function applied by the historian
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Aggregation {
    pub name: String,
    /// Bucket width, e.g. `5m`; empty means one bucket over the whole window
    pub period: String,
    pub arguments: Vec<Value>,
    pub fill: String,
}

impl Aggregation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    /// Parsed bucket width, `None` when empty or unparsable
    pub fn period_duration(&self) -> Option<Duration> {
        parse_period(&self.period)
    }
}

/// Parse a period such as `5m` or `1h30m`
pub fn parse_period(period: &str) -> Option<Duration> {
    let period = period.trim();
    if period.is_empty() {
        return None;
    }
    humantime::parse_duration(period)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Render a duration in the period syntax accepted by [`parse_period`]
pub fn format_period(duration: Duration) -> String {
    humantime::format_duration(duration).to_string().replace(' ', "")
}

/// Value predicate forwarded to the historian
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ValueFilter {
    pub value: Value,
    pub operator: String,
    pub condition: String,
}

/// Independent toggles shaping a measurement query result
///
/// All toggles default to off, which passes series through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryOptions {
    pub tags: BTreeMap<String, String>,
    pub aggregation: Option<Aggregation>,
    pub limit: Option<usize>,
    pub group_by: Vec<String>,
    pub value_filters: Vec<ValueFilter>,
    pub include_last_known_point: bool,
    pub fill_initial_empty_values: bool,
    pub changes_only: bool,
    pub use_engineering_specs: bool,
    pub metadata_as_labels: bool,
    pub display_database_name: bool,
    pub display_description: bool,
}

impl QueryOptions {
    /// Whether a last known point has to be fetched before the window
    pub fn needs_last_known_point(&self) -> bool {
        self.include_last_known_point || self.fill_initial_empty_values
    }
}

/// Measurements selected by name, keyword, regex or UUID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MeasurementQuery {
    /// Database names or UUIDs restricting keyword lookups
    pub databases: Vec<String>,
    pub measurement: String,
    pub measurements: Vec<String>,
    pub options: QueryOptions,
    pub regex: String,
    pub is_regex: bool,
}

impl MeasurementQuery {
    /// Requested measurement identifiers, regex first when enabled
    pub fn requested(&self) -> Vec<String> {
        if self.is_regex {
            return vec![format!("/{}/", self.regex)];
        }
        let mut requested = self.measurements.clone();
        if !self.measurement.is_empty() && !requested.contains(&self.measurement) {
            requested.insert(0, self.measurement.clone());
        }
        requested
    }
}

/// Measurements selected through asset properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AssetMeasurementQuery {
    /// Asset paths, UUIDs or `/regex/` patterns
    pub assets: Vec<String>,
    /// Property names or UUIDs
    pub asset_properties: Vec<String>,
    pub options: QueryOptions,
}

/// Query text executed verbatim against one time-series database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawQuery {
    pub query: String,
    pub timeseries_database: String,
}

/// Shape of the tables produced for an event query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventQueryType {
    Simple,
    Periodic,
    PeriodicWithDimension,
}

impl EventQueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventQueryType::Simple => "simple",
            EventQueryType::Periodic => "periodic",
            EventQueryType::PeriodicWithDimension => "periodicWithDimension",
        }
    }
}

impl fmt::Display for EventQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventQueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(EventQueryType::Simple),
            "periodic" => Ok(EventQueryType::Periodic),
            "periodicWithDimension" => Ok(EventQueryType::PeriodicWithDimension),
            other => Err(other.to_string()),
        }
    }
}

/// Optional window replacing the dashboard range for an event query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideTimeRange {
    #[serde(rename = "fromParsed", default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(rename = "toParsed", default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventQuery {
    /// `simple`, `periodic` or `periodicWithDimension`
    #[serde(rename = "Type")]
    pub query_type: String,
    pub assets: Vec<String>,
    pub event_types: Vec<String>,
    pub statuses: Vec<String>,
    /// Event-type property allow-list by name or UUID
    pub properties: Vec<String>,
    pub property_filter: Vec<EventPropertyValueFilter>,
    pub include_parent_info: bool,
    pub query_asset_properties: bool,
    pub asset_properties: Vec<String>,
    /// Options of the per-event asset-property side queries
    pub options: Option<QueryOptions>,
    pub limit: Option<usize>,
    #[serde(rename = "overrideTimeRange")]
    pub override_time_range: bool,
    pub time_range: OverrideTimeRange,
}

impl EventQuery {
    /// Dashboard range, replaced by the query's own bounds when enabled
    pub fn effective_range(&self, range: &TimeRange) -> TimeRange {
        if !self.override_time_range {
            return *range;
        }
        TimeRange {
            from: self.time_range.from.unwrap_or(range.from),
            to: self.time_range.to.unwrap_or(range.to),
        }
    }
}

/// Series query sent to the historian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistorianQuery {
    #[serde(rename = "MeasurementUUIDs")]
    pub measurement_uuids: Vec<Uuid>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub value_filters: Vec<ValueFilter>,
    pub aggregation: Option<Aggregation>,
    pub limit: Option<usize>,
}

impl HistorianQuery {
    /// Build a series query from resolved measurements and options
    ///
    /// The window is truncated to whole seconds and an aggregation period of
    /// `$__interval` is replaced by the panel interval.
    pub fn new(
        measurement_uuids: Vec<Uuid>,
        range: &TimeRange,
        interval: Duration,
        options: &QueryOptions,
    ) -> Self {
        let aggregation = options.aggregation.clone().map(|mut agg| {
            if agg.period == INTERVAL_VARIABLE {
                agg.period = format_period(interval);
            }
            agg
        });

        Self {
            measurement_uuids,
            start: truncate_to_second(range.from),
            end: Some(truncate_to_second(range.to)),
            tags: options.tags.clone(),
            group_by: options.group_by.clone(),
            value_filters: options.value_filters.clone(),
            aggregation,
            limit: options.limit,
        }
    }
}

pub fn truncate_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(750),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_interval_variable_replaced() {
        let options = QueryOptions {
            aggregation: Some(Aggregation::new("mean").with_period(INTERVAL_VARIABLE)),
            ..Default::default()
        };
        let query = HistorianQuery::new(vec![], &range(), Duration::from_secs(90), &options);

        let agg = query.aggregation.unwrap();
        assert_eq!(agg.period, "1m30s");
        assert_eq!(agg.period_duration(), Some(Duration::from_secs(90)));
        assert_eq!(query.start.nanosecond(), 0);
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_period("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_period(""), None);
        assert_eq!(parse_period("soon"), None);
    }

    #[test]
    fn test_event_query_type() {
        assert_eq!("simple".parse::<EventQueryType>(), Ok(EventQueryType::Simple));
        assert_eq!(
            "periodicWithDimension".parse::<EventQueryType>(),
            Ok(EventQueryType::PeriodicWithDimension)
        );
        assert_eq!("pivot".parse::<EventQueryType>(), Err("pivot".to_string()));
    }

    #[test]
    fn test_requested_measurements() {
        let query = MeasurementQuery {
            measurement: "temp".into(),
            measurements: vec!["pressure".into()],
            ..Default::default()
        };
        assert_eq!(query.requested(), vec!["temp", "pressure"]);

        let regex = MeasurementQuery {
            regex: "line_.*".into(),
            is_regex: true,
            ..Default::default()
        };
        assert_eq!(regex.requested(), vec!["/line_.*/"]);
    }

    #[test]
    fn test_override_time_range() {
        let mut query = EventQuery::default();
        assert_eq!(query.effective_range(&range()), range());

        let from = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        query.override_time_range = true;
        query.time_range.from = Some(from);
        assert_eq!(query.effective_range(&range()).from, from);
        assert_eq!(query.effective_range(&range()).to, range().to);
    }
}
