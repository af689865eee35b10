//! Measurement queries and the shared series pipeline

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hf_core::{
    Aggregation, HistorianQuery, Measurement, MeasurementFilter, MeasurementQuery, QueryOptions,
    TimeRange,
};
use hf_data::naming::{apply_metadata_labels, set_measurement_names, sort_by_status};
use hf_data::series::query_result_to_tables;
use hf_data::{
    dedupe_by_identity, delete_leading_points, fill_initial_empty_values, keep_changes_only,
    merge_tables, NamingOptions, Table,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::QueryContext;
use crate::QueryError;

/// Status tag of the catch-all last known point query
const GOOD_STATUS: (&str, &str) = ("status", "Good");

/// Aggregation fetching the last point of a window
const LAST_AGGREGATION: &str = "last";

/// Run a measurement query: resolve, fetch, reshape and name
pub async fn handle_measurement_query(
    ctx: &QueryContext,
    query: &MeasurementQuery,
    range: &TimeRange,
    interval: Duration,
    series_limit: usize,
) -> Result<Vec<Table>, QueryError> {
    let measurements = resolve_measurements(ctx, query, series_limit).await?;
    let uuids = measurements.iter().map(|m| m.uuid).collect();
    let historian_query = HistorianQuery::new(uuids, range, interval, &query.options);

    let mut tables = handle_series_query(ctx, &historian_query, &query.options, &measurements).await?;
    set_measurement_names(&mut tables, NamingOptions::from(&query.options));
    if query.options.metadata_as_labels {
        apply_metadata_labels(&mut tables);
    }
    sort_by_status(&mut tables);
    Ok(tables)
}

/// Measurements named by a query
///
/// UUIDs are taken as they are; anything else is a keyword (or `/regex/`)
/// lookup restricted to the query's databases. A lookup without matches is
/// an error.
pub async fn resolve_measurements(
    ctx: &QueryContext,
    query: &MeasurementQuery,
    series_limit: usize,
) -> Result<Vec<Measurement>, QueryError> {
    let requested = query.requested();
    let database_uuids = if requested.iter().all(|r| Uuid::parse_str(r).is_ok()) {
        Vec::new()
    } else {
        resolve_databases(ctx, &query.databases).await?
    };

    let mut resolved: BTreeMap<Uuid, Measurement> = BTreeMap::new();
    let mut order = Vec::new();
    for requested in requested {
        let found = match Uuid::parse_str(&requested) {
            Ok(uuid) => vec![ctx.fetch(ctx.api.fetch_measurement(uuid)).await?],
            Err(_) => {
                let filter = MeasurementFilter {
                    keyword: Some(requested.clone()),
                    database_uuids: database_uuids.clone(),
                    limit: Some(series_limit),
                };
                ctx.fetch(ctx.api.fetch_measurements(&filter)).await?
            }
        };
        if found.is_empty() {
            return Err(QueryError::InvalidMeasurement(requested));
        }
        for measurement in found {
            if !resolved.contains_key(&measurement.uuid) {
                order.push(measurement.uuid);
                resolved.insert(measurement.uuid, measurement);
            }
        }
    }

    debug!("resolved {} measurements", order.len());
    Ok(order.into_iter().filter_map(|uuid| resolved.remove(&uuid)).collect())
}

/// Database selectors (names or UUIDs) to UUIDs
async fn resolve_databases(ctx: &QueryContext, selectors: &[String]) -> Result<Vec<Uuid>, QueryError> {
    if selectors.is_empty() {
        return Ok(Vec::new());
    }
    let databases = ctx.fetch(ctx.api.fetch_databases()).await?;
    let mut uuids = Vec::new();
    for selector in selectors {
        match Uuid::parse_str(selector) {
            Ok(uuid) => uuids.push(uuid),
            Err(_) => uuids.extend(databases.iter().filter(|db| &db.name == selector).map(|db| db.uuid)),
        }
    }
    Ok(uuids)
}

/// Fetch measurement metadata by UUID, in the given order
pub async fn fetch_measurements_by_uuid(ctx: &QueryContext, uuids: &[Uuid]) -> Result<Vec<Measurement>, QueryError> {
    let mut measurements = Vec::with_capacity(uuids.len());
    for uuid in uuids {
        measurements.push(ctx.fetch(ctx.api.fetch_measurement(*uuid)).await?);
    }
    Ok(measurements)
}

/// Run a series query and post-process its tables
///
/// Stages run in a fixed order: last known points are merged in, the
/// leading gap is filled, last known points that were only fetched for
/// filling are dropped, then repeated values are removed.
pub async fn handle_series_query(
    ctx: &QueryContext,
    query: &HistorianQuery,
    options: &QueryOptions,
    measurements: &[Measurement],
) -> Result<Vec<Table>, QueryError> {
    let result = ctx.fetch(ctx.api.run_series_query(query)).await?;
    let mut tables = query_result_to_tables(&result, measurements, options.use_engineering_specs);
    info!("series query returned {} tables", tables.len());

    if options.needs_last_known_point() {
        let known = fetch_last_known_points(ctx, query, &tables, options, measurements).await?;
        tables = merge_tables(known, tables);

        if options.fill_initial_empty_values {
            let period = query.aggregation.as_ref().map(|a| a.period.as_str());
            fill_initial_empty_values(&mut tables, query.start, query.end, period);
        }
        if !options.include_last_known_point {
            delete_leading_points(&mut tables);
        }
    }

    if options.changes_only {
        keep_changes_only(&mut tables);
    }
    Ok(tables)
}

/// Earliest start of a last known point query
fn history_start() -> DateTime<Utc> {
    DateTime::<Utc>::default() + chrono::Duration::milliseconds(1)
}

/// Last point query ending where `query` starts
fn last_point_query(query: &HistorianQuery) -> HistorianQuery {
    let mut last = query.clone();
    last.start = history_start();
    last.end = Some(query.start);
    last.aggregation = Some(Aggregation::new(LAST_AGGREGATION));
    last
}

/// Queries for the last point before the window
///
/// Without a tag filter, every result table gets its own query (its
/// measurement and labels as tags) plus one catch-all query for good
/// values; with a tag filter only the catch-all query with those tags runs.
pub fn last_point_queries(query: &HistorianQuery, tables: &[Table]) -> Vec<HistorianQuery> {
    let mut queries = Vec::new();
    let mut general = last_point_query(query);

    if query.tags.is_empty() {
        for table in tables {
            let Some(uuid) = table.meta.measurement_uuid else { continue };
            let mut per_table = last_point_query(query);
            per_table.measurement_uuids = vec![uuid];
            per_table.tags = table.meta.labels.clone();
            queries.push(per_table);
        }
        general.tags = [(GOOD_STATUS.0.to_string(), GOOD_STATUS.1.to_string())].into();
    }

    queries.push(general);
    queries
}

async fn fetch_last_known_points(
    ctx: &QueryContext,
    query: &HistorianQuery,
    tables: &[Table],
    options: &QueryOptions,
    measurements: &[Measurement],
) -> Result<Vec<Table>, QueryError> {
    let mut known = Vec::new();
    for last_query in last_point_queries(query, tables) {
        let result = ctx.fetch(ctx.api.run_series_query(&last_query)).await?;
        known.extend(query_result_to_tables(&result, measurements, options.use_engineering_specs));
    }

    let mut known = dedupe_by_identity(known);
    for table in known.iter_mut() {
        table.meta.leading_point = true;
    }
    debug!("fetched {} last known points", known.len());
    Ok(known)
}
