//! Event queries and their per-event asset-property side queries

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hf_core::query::format_period;
use hf_core::{
    AssetFilter, AssetIndex, AssetProperty, AssetPropertyFilter, Event, EventFilter, EventQuery,
    EventQueryType, EventTypeFilter, EventTypePropertyFilter, HistorianQuery, PropertyType,
    QueryOptions, TimeRange,
};
use hf_data::events::{simple_event_tables, trend_event_table, EventFrameInput};
use hf_data::naming::{set_asset_names, sort_by_status};
use hf_data::{NamingOptions, Table};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assets::PropertyBinding;
use crate::context::QueryContext;
use crate::filters::{filter_assets, filter_event_types};
use crate::measurement::{fetch_measurements_by_uuid, handle_series_query};
use crate::QueryError;

/// Run an event query
///
/// Assets or event types resolving to nothing give an empty result.
pub async fn handle_event_query(
    ctx: &QueryContext,
    query: &EventQuery,
    range: &TimeRange,
    interval: Duration,
    series_limit: usize,
) -> Result<Vec<Table>, QueryError> {
    let range = query.effective_range(range);

    let index = AssetIndex::new(ctx.fetch(ctx.api.fetch_assets(&AssetFilter::default())).await?);
    let assets = filter_assets(&index, &query.assets);
    let event_types = ctx
        .fetch(ctx.api.fetch_event_types(&EventTypeFilter::default()))
        .await?;
    let selected_types = filter_event_types(&event_types, &query.event_types);
    if assets.is_empty() || selected_types.is_empty() {
        debug!("event query selects no assets or event types");
        return Ok(Vec::new());
    }

    let query_type: EventQueryType = query
        .query_type
        .parse()
        .map_err(QueryError::UnsupportedEventQueryType)?;

    let filter = EventFilter {
        start_time: range.from,
        stop_time: range.to,
        asset_uuids: assets,
        event_type_uuids: selected_types,
        statuses: query.statuses.clone(),
        property_filter: query.property_filter.clone(),
        limit: query.limit,
        preload_properties: true,
    };
    let events = ctx.fetch(ctx.api.fetch_events(&filter)).await?;
    info!("event query returned {} events", events.len());

    let mut present: BTreeSet<Uuid> = BTreeSet::new();
    for event in &events {
        present.insert(event.event_type_uuid);
        if let Some(parent) = event.parent.as_deref() {
            present.insert(parent.event_type_uuid);
        }
    }
    let property_filter = EventTypePropertyFilter {
        event_type_uuids: present.into_iter().collect(),
        types: match query_type {
            EventQueryType::Simple => vec![PropertyType::Simple],
            _ => Vec::new(),
        },
    };
    let properties = ctx
        .fetch(ctx.api.fetch_event_type_properties(&property_filter))
        .await?;

    let index = Arc::new(index);
    let side_tables = match &query.options {
        Some(options) if query.query_asset_properties => {
            let side = SideQuery {
                query_type,
                asset_properties: Arc::new(query.asset_properties.clone()),
                options: Arc::new(options.clone()),
                assets: Arc::clone(&index),
                range,
                interval,
                series_limit,
            };
            side.run_all(ctx, &events).await?
        }
        _ => BTreeMap::new(),
    };

    let input = EventFrameInput::new(&events, &index, &event_types, &properties, &side_tables)
        .with_selected(&query.properties)
        .with_parent_info(query.include_parent_info);

    let tables = match query_type {
        EventQueryType::Simple => simple_event_tables(&input)?,
        EventQueryType::Periodic => vec![trend_event_table(&input, false)?],
        EventQueryType::PeriodicWithDimension => vec![trend_event_table(&input, true)?],
    };
    Ok(tables)
}

/// Asset-property series fetched over each event's own window
#[derive(Clone)]
struct SideQuery {
    query_type: EventQueryType,
    asset_properties: Arc<Vec<String>>,
    options: Arc<QueryOptions>,
    assets: Arc<AssetIndex>,
    range: TimeRange,
    interval: Duration,
    series_limit: usize,
}

impl SideQuery {
    /// Run the side query of every event concurrently
    ///
    /// At most `max_concurrent_queries` run at once. The first failure
    /// cancels the others and is returned.
    async fn run_all(&self, ctx: &QueryContext, events: &[Event]) -> Result<BTreeMap<Uuid, Vec<Table>>, QueryError> {
        let mut side_tables = BTreeMap::new();
        if events.is_empty() {
            return Ok(side_tables);
        }
        if self.options.aggregation.is_none() {
            return Err(QueryError::MissingAggregation);
        }

        let properties = Arc::new(
            ctx.fetch(ctx.api.fetch_asset_properties(&AssetPropertyFilter::default()))
                .await?,
        );

        let scope = ctx.scope.child();
        let side_ctx = ctx.with_scope(scope.clone());
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_queries.max(1)));
        let mut set = JoinSet::new();
        for event in events {
            let side = self.clone();
            let ctx = side_ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            let properties = Arc::clone(&properties);
            let event = event.clone();
            set.spawn(async move {
                let _permit = ctx
                    .scope
                    .run(async { semaphore.acquire_owned().await.map_err(|_| QueryError::Cancelled) })
                    .await?;
                let tables = side.run_one(&ctx, &event, &properties).await?;
                Ok::<_, QueryError>((event.uuid, tables))
            });
        }

        while let Some(joined) = set.join_next().await {
            let outcome = joined.map_err(|err| QueryError::Task(err.to_string())).and_then(|r| r);
            match outcome {
                Ok((event, tables)) => {
                    if !tables.is_empty() {
                        side_tables.insert(event, tables);
                    }
                }
                Err(err) => {
                    warn!("asset property query failed, cancelling the rest: {}", err);
                    scope.cancel();
                    set.abort_all();
                    return Err(err);
                }
            }
        }
        Ok(side_tables)
    }

    async fn run_one(
        &self,
        ctx: &QueryContext,
        event: &Event,
        properties: &[AssetProperty],
    ) -> Result<Vec<Table>, QueryError> {
        let binding = bind_event_properties(event, properties, &self.asset_properties, self.series_limit);
        if binding.is_empty() {
            return Ok(Vec::new());
        }

        let measurements = fetch_measurements_by_uuid(ctx, &binding.measurement_uuids).await?;
        let mut query = HistorianQuery::new(
            binding.measurement_uuids.clone(),
            &self.range,
            self.interval,
            &self.options,
        );
        query.start = event.start_time;
        query.end = event.stop_time;

        // Simple events get a single bucket spanning the whole event
        if self.query_type == EventQueryType::Simple {
            let stop = event.stop_time.unwrap_or_else(Utc::now);
            let span = (stop - event.start_time).to_std().unwrap_or_default();
            if let Some(aggregation) = query.aggregation.as_mut() {
                aggregation.period = format_period(span);
            }
        }

        let tables = handle_series_query(ctx, &query, &self.options, &measurements).await?;
        let mut tables = set_asset_names(
            tables,
            &binding.properties,
            &self.assets,
            NamingOptions::from(self.options.as_ref()),
        );
        sort_by_status(&mut tables);
        Ok(tables)
    }
}

/// Bind selectors for one event
///
/// A selector matches a property of the event's asset by name, or any
/// property by UUID. Once `series_limit` measurements are bound, only
/// properties of already bound measurements are added.
pub fn bind_event_properties(
    event: &Event,
    properties: &[AssetProperty],
    selectors: &[String],
    series_limit: usize,
) -> PropertyBinding {
    let mut binding = PropertyBinding::default();
    for selector in selectors {
        let found = properties.iter().find(|p| {
            (p.name == *selector && p.asset_uuid == event.asset_uuid) || p.uuid.to_string() == *selector
        });
        let Some(property) = found else { continue };
        let Some(measurement) = property.measurement_uuid else { continue };
        if binding.measurement_uuids.len() >= series_limit && !binding.measurement_uuids.contains(&measurement) {
            continue;
        }
        if !binding.measurement_uuids.contains(&measurement) {
            binding.measurement_uuids.push(measurement);
        }
        binding.properties.push(property.clone());
    }
    binding
}
