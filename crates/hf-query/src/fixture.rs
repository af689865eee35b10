//! In-memory historian backed by a JSON fixture
//!
//! Used by the CLI and the tests. Series queries filter the stored points by
//! window and tags and understand the `last` aggregation; other aggregations
//! return the raw points. Event property filters are not evaluated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hf_core::{
    ApiError, Asset, AssetFilter, AssetProperty, AssetPropertyFilter, Event, EventFilter,
    EventType, EventTypeFilter, EventTypeProperty, EventTypePropertyFilter, HistorianApi,
    HistorianQuery, Measurement, MeasurementFilter, QueryResult, Series, TimeseriesDatabase,
};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Contents of a fixture file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    pub databases: Vec<TimeseriesDatabase>,
    pub measurements: Vec<Measurement>,
    /// Series matched to measurements by name
    pub series: Vec<Series>,
    pub assets: Vec<Asset>,
    pub asset_properties: Vec<AssetProperty>,
    pub event_types: Vec<EventType>,
    pub event_type_properties: Vec<EventTypeProperty>,
    pub events: Vec<Event>,
    /// Raw query results keyed by database name
    pub raw_results: BTreeMap<String, QueryResult>,
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self, ApiError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ApiError::Transport(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&text)
    }
}

/// [`HistorianApi`] over a [`Fixture`]
pub struct FixtureApi {
    fixture: Fixture,
    latency: Option<Duration>,
    failing: BTreeSet<Uuid>,
    calls: Mutex<Vec<String>>,
    series_queries: Mutex<Vec<HistorianQuery>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FixtureApi {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            latency: None,
            failing: BTreeSet::new(),
            calls: Mutex::new(Vec::new()),
            series_queries: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail series queries that include `measurement`
    pub fn with_failing_measurement(mut self, measurement: Uuid) -> Self {
        self.failing.insert(measurement);
        self
    }

    /// Names of the API methods called so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Series queries received so far
    pub fn series_queries(&self) -> Vec<HistorianQuery> {
        self.series_queries.lock().clone()
    }

    /// Highest number of calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: &str) -> InFlight<'_> {
        self.calls.lock().push(call.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn measurement(&self, uuid: &Uuid) -> Option<&Measurement> {
        self.fixture.measurements.iter().find(|m| &m.uuid == uuid)
    }

    fn series_for(&self, measurement: &Measurement, query: &HistorianQuery) -> Vec<Series> {
        let start = query.start.timestamp_millis();
        let end = query.end.map(|e| e.timestamp_millis()).unwrap_or(i64::MAX);
        let last_only = query
            .aggregation
            .as_ref()
            .map_or(false, |a| a.name == "last");

        let mut found = Vec::new();
        for series in self.fixture.series.iter().filter(|s| s.measurement == measurement.name) {
            if !tags_match(series, &query.tags) {
                continue;
            }
            let mut series = series.clone();
            series.data_points.retain(|p| p.timestamp >= start && p.timestamp < end);
            if last_only {
                let last = series.data_points.pop();
                series.data_points = last.into_iter().collect();
            }
            if series.data_points.is_empty() {
                continue;
            }
            found.push(series);
        }
        found
    }
}

/// Decrements the in-flight counter when dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn tags_match(series: &Series, tags: &BTreeMap<String, String>) -> bool {
    tags.iter().all(|(key, wanted)| match series.tags.get(key) {
        Some(serde_json::Value::String(value)) => value == wanted,
        Some(other) => &other.to_string() == wanted,
        None => false,
    })
}

fn keyword_matches(keyword: &str, name: &str) -> bool {
    match keyword.strip_prefix('/').and_then(|k| k.strip_suffix('/')) {
        Some(pattern) => Regex::new(pattern).map_or(false, |re| re.is_match(name)),
        None => name.to_lowercase().contains(&keyword.to_lowercase()),
    }
}

fn selected<T: PartialEq>(filter: &[T], value: &T) -> bool {
    filter.is_empty() || filter.contains(value)
}

#[async_trait]
impl HistorianApi for FixtureApi {
    async fn fetch_measurements(&self, filter: &MeasurementFilter) -> Result<Vec<Measurement>, ApiError> {
        let _call = self.enter("fetch_measurements").await;
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(self
            .fixture
            .measurements
            .iter()
            .filter(|m| filter.keyword.as_deref().map_or(true, |k| keyword_matches(k, &m.name)))
            .filter(|m| {
                filter.database_uuids.is_empty()
                    || m.database_uuid.map_or(false, |db| filter.database_uuids.contains(&db))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_measurement(&self, uuid: Uuid) -> Result<Measurement, ApiError> {
        let _call = self.enter("fetch_measurement").await;
        self.measurement(&uuid)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("measurement {uuid}")))
    }

    async fn fetch_databases(&self) -> Result<Vec<TimeseriesDatabase>, ApiError> {
        let _call = self.enter("fetch_databases").await;
        Ok(self.fixture.databases.clone())
    }

    async fn fetch_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, ApiError> {
        let _call = self.enter("fetch_assets").await;
        Ok(self
            .fixture
            .assets
            .iter()
            .filter(|a| selected(&filter.uuids, &a.uuid))
            .cloned()
            .collect())
    }

    async fn fetch_asset_properties(&self, filter: &AssetPropertyFilter) -> Result<Vec<AssetProperty>, ApiError> {
        let _call = self.enter("fetch_asset_properties").await;
        Ok(self
            .fixture
            .asset_properties
            .iter()
            .filter(|p| selected(&filter.asset_uuids, &p.asset_uuid))
            .cloned()
            .collect())
    }

    async fn fetch_event_types(&self, filter: &EventTypeFilter) -> Result<Vec<EventType>, ApiError> {
        let _call = self.enter("fetch_event_types").await;
        Ok(self
            .fixture
            .event_types
            .iter()
            .filter(|t| selected(&filter.uuids, &t.uuid))
            .cloned()
            .collect())
    }

    async fn fetch_event_type_properties(
        &self,
        filter: &EventTypePropertyFilter,
    ) -> Result<Vec<EventTypeProperty>, ApiError> {
        let _call = self.enter("fetch_event_type_properties").await;
        Ok(self
            .fixture
            .event_type_properties
            .iter()
            .filter(|p| selected(&filter.event_type_uuids, &p.event_type_uuid))
            .filter(|p| selected(&filter.types, &p.property_type))
            .cloned()
            .collect())
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<Event>, ApiError> {
        let _call = self.enter("fetch_events").await;
        let limit = filter.limit.unwrap_or(usize::MAX);
        let events = self
            .fixture
            .events
            .iter()
            .filter(|e| selected(&filter.asset_uuids, &e.asset_uuid))
            .filter(|e| selected(&filter.event_type_uuids, &e.event_type_uuid))
            .filter(|e| selected(&filter.statuses, &e.status))
            .filter(|e| e.start_time < filter.stop_time && e.stop_time.map_or(true, |stop| stop > filter.start_time))
            .take(limit)
            .map(|e| {
                let mut event = e.clone();
                if event.parent.is_none() {
                    event.parent = event
                        .parent_uuid
                        .and_then(|p| self.fixture.events.iter().find(|c| c.uuid == p))
                        .map(|p| Box::new(Event { parent: None, ..p.clone() }));
                }
                if !filter.preload_properties {
                    event.properties = None;
                }
                event
            })
            .collect();
        Ok(events)
    }

    async fn run_series_query(&self, query: &HistorianQuery) -> Result<QueryResult, ApiError> {
        let _call = self.enter("run_series_query").await;
        self.series_queries.lock().push(query.clone());

        if let Some(failing) = query.measurement_uuids.iter().find(|u| self.failing.contains(u)) {
            return Err(ApiError::Status {
                status: 500,
                message: format!("series of {failing} unavailable"),
            });
        }

        let series: Vec<Series> = query
            .measurement_uuids
            .iter()
            .filter_map(|uuid| self.measurement(uuid))
            .flat_map(|m| self.series_for(m, query))
            .collect();
        debug!("fixture answered series query with {} series", series.len());

        Ok(QueryResult {
            series,
            executed_query: Some(format!(
                "series {} from {} to {}",
                query.measurement_uuids.len(),
                query.start.to_rfc3339(),
                query.end.map(|e| e.to_rfc3339()).unwrap_or_default()
            )),
        })
    }

    async fn run_raw_query(&self, database: &str, query: &str) -> Result<QueryResult, ApiError> {
        let _call = self.enter("run_raw_query").await;
        let mut result = self
            .fixture
            .raw_results
            .get(database)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("database {database}")))?;
        result.executed_query = Some(query.to_string());
        Ok(result)
    }

    fn source_name(&self) -> &str {
        "fixture"
    }
}
