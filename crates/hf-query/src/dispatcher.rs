//! Routing of panel queries to their handlers

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use hf_core::{
    AssetMeasurementQuery, EngineConfig, EventQuery, HistorianApi, MeasurementQuery, RawQuery,
    TimeRange,
};
use hf_data::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::assets::handle_asset_measurement_query;
use crate::context::{CancelScope, QueryContext};
use crate::events::handle_event_query;
use crate::measurement::handle_measurement_query;
use crate::raw::handle_raw_query;
use crate::QueryError;

/// Kinds of query a panel can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    MeasurementQuery,
    AssetMeasurementQuery,
    RawQuery,
    EventQuery,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::MeasurementQuery => "MeasurementQuery",
            QueryKind::AssetMeasurementQuery => "AssetMeasurementQuery",
            QueryKind::RawQuery => "RawQuery",
            QueryKind::EventQuery => "EventQuery",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MeasurementQuery" => Ok(QueryKind::MeasurementQuery),
            "AssetMeasurementQuery" => Ok(QueryKind::AssetMeasurementQuery),
            "RawQuery" => Ok(QueryKind::RawQuery),
            "EventQuery" => Ok(QueryKind::EventQuery),
            other => Err(QueryError::UnsupportedQueryType(other.to_string())),
        }
    }
}

/// One panel query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    /// Name of a [`QueryKind`]; anything else is rejected when run
    #[serde(rename = "queryType")]
    pub kind: String,
    /// Kind-specific descriptor
    #[serde(default)]
    pub query: Value,
    pub time_range: TimeRange,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default)]
    pub series_limit: Option<usize>,
}

impl DataQuery {
    pub fn new(ref_id: impl Into<String>, kind: QueryKind, query: Value, time_range: TimeRange) -> Self {
        Self {
            ref_id: ref_id.into(),
            kind: kind.as_str().to_string(),
            query,
            time_range,
            interval_ms: 0,
            series_limit: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn descriptor<T: serde::de::DeserializeOwned>(&self) -> Result<T, QueryError> {
        Ok(serde_json::from_value(self.query.clone())?)
    }
}

/// Runs panel queries against one historian
#[derive(Clone)]
pub struct QueryDispatcher {
    api: Arc<dyn HistorianApi>,
    config: Arc<EngineConfig>,
}

impl QueryDispatcher {
    pub fn new(api: Arc<dyn HistorianApi>, config: EngineConfig) -> Self {
        Self {
            api,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one query to completion under `scope`
    pub async fn run(&self, query: &DataQuery, scope: &CancelScope) -> Result<Vec<Table>, QueryError> {
        scope.check()?;
        let kind: QueryKind = query.kind.parse()?;
        let ctx = QueryContext::new(Arc::clone(&self.api), Arc::clone(&self.config), scope.clone());
        let range = query.time_range;
        let interval = query.interval();
        let series_limit = query.series_limit.unwrap_or(self.config.series_limit);

        debug!("running {} query {}", kind, query.ref_id);
        match kind {
            QueryKind::MeasurementQuery => {
                let descriptor: MeasurementQuery = query.descriptor()?;
                handle_measurement_query(&ctx, &descriptor, &range, interval, series_limit).await
            }
            QueryKind::AssetMeasurementQuery => {
                let descriptor: AssetMeasurementQuery = query.descriptor()?;
                handle_asset_measurement_query(&ctx, &descriptor, &range, interval, series_limit).await
            }
            QueryKind::RawQuery => {
                let descriptor: RawQuery = query.descriptor()?;
                handle_raw_query(&ctx, &descriptor, &range, interval).await
            }
            QueryKind::EventQuery => {
                let descriptor: EventQuery = query.descriptor()?;
                handle_event_query(&ctx, &descriptor, &range, interval, series_limit).await
            }
        }
    }

    /// Run a batch of queries concurrently
    ///
    /// At most `max_concurrent_queries` run at once. Each query fails on its
    /// own; queries still waiting when `scope` is cancelled end with
    /// [`QueryError::Cancelled`]. Results are keyed by ref id; only the first
    /// query of a repeated ref id runs, later ones are skipped.
    pub async fn run_batch(
        &self,
        queries: Vec<DataQuery>,
        scope: &CancelScope,
    ) -> BTreeMap<String, Result<Vec<Table>, QueryError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_queries.max(1)));
        info!("running batch of {} queries", queries.len());

        let mut seen = AHashSet::new();
        let handles: Vec<_> = queries
            .into_iter()
            .filter(|query| {
                let first = seen.insert(query.ref_id.clone());
                if !first {
                    warn!("skipping query {}: ref id already in this batch", query.ref_id);
                }
                first
            })
            .map(|query| {
                let dispatcher = self.clone();
                let semaphore = Arc::clone(&semaphore);
                let scope = scope.clone();
                let ref_id = query.ref_id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = scope
                        .run(async { semaphore.acquire_owned().await.map_err(|_| QueryError::Cancelled) })
                        .await?;
                    dispatcher.run(&query, &scope).await
                });
                (ref_id, handle)
            })
            .collect();

        let mut responses = BTreeMap::new();
        for (ref_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(QueryError::Task(err.to_string())),
            };
            if let Err(err) = &result {
                warn!("query {} failed: {}", ref_id, err);
            }
            responses.insert(ref_id, result);
        }
        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Fixture, FixtureApi};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        )
    }

    fn dispatcher() -> QueryDispatcher {
        QueryDispatcher::new(Arc::new(FixtureApi::new(Fixture::default())), EngineConfig::default())
    }

    #[test]
    fn test_query_kind_round_trip() {
        for kind in [
            QueryKind::MeasurementQuery,
            QueryKind::AssetMeasurementQuery,
            QueryKind::RawQuery,
            QueryKind::EventQuery,
        ] {
            assert_eq!(kind.as_str().parse::<QueryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_decode_data_query() {
        let query: DataQuery = serde_json::from_value(json!({
            "refId": "A",
            "queryType": "RawQuery",
            "query": {"Query": "SELECT 1", "TimeseriesDatabase": "influx"},
            "timeRange": {"from": "2024-01-01T00:00:00Z", "to": "2024-01-01T01:00:00Z"},
            "intervalMs": 60000
        }))
        .unwrap();
        assert_eq!(query.interval(), Duration::from_secs(60));
        assert_eq!(query.series_limit, None);
        let raw: RawQuery = query.descriptor().unwrap();
        assert_eq!(raw.timeseries_database, "influx");
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let mut query = DataQuery::new("A", QueryKind::RawQuery, json!({}), range());
        query.kind = "TagQuery".into();
        let err = dispatcher().run(&query, &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedQueryType(kind) if kind == "TagQuery"));
    }

    #[tokio::test]
    async fn test_invalid_descriptor() {
        let query = DataQuery::new("A", QueryKind::MeasurementQuery, json!({"Measurements": 5}), range());
        let err = dispatcher().run(&query, &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_repeated_ref_id_runs_first_query() {
        let mut first = DataQuery::new("A", QueryKind::RawQuery, json!({}), range());
        first.kind = "TagQuery".into();
        let queries = vec![
            first,
            DataQuery::new("A", QueryKind::MeasurementQuery, json!({"Measurements": 5}), range()),
        ];
        let responses = dispatcher().run_batch(queries, &CancelScope::new()).await;
        assert_eq!(responses.len(), 1);
        assert!(matches!(&responses["A"], Err(QueryError::UnsupportedQueryType(_))));
    }

    #[tokio::test]
    async fn test_cancelled_batch() {
        let scope = CancelScope::new();
        scope.cancel();
        let queries = vec![
            DataQuery::new("A", QueryKind::RawQuery, json!({}), range()),
            DataQuery::new("B", QueryKind::RawQuery, json!({}), range()),
        ];
        let responses = dispatcher().run_batch(queries, &scope).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.values().all(|r| matches!(r, Err(QueryError::Cancelled))));
    }
}
