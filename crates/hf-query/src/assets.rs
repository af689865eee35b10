//! Asset-measurement queries

use std::time::Duration;

use ahash::AHashMap;
use hf_core::{
    AssetFilter, AssetIndex, AssetMeasurementQuery, AssetProperty, AssetPropertyFilter,
    HistorianQuery, TimeRange,
};
use hf_data::naming::{apply_metadata_labels, set_asset_names, sort_by_status};
use hf_data::{NamingOptions, Table};
use tracing::debug;
use uuid::Uuid;

use crate::context::QueryContext;
use crate::filters::filter_assets;
use crate::measurement::{fetch_measurements_by_uuid, handle_series_query};
use crate::QueryError;

/// Measurements bound to the requested asset properties
#[derive(Debug, Default)]
pub struct PropertyBinding {
    /// Distinct measurement UUIDs in binding order
    pub measurement_uuids: Vec<Uuid>,
    /// Every matched property, one per asset and selector
    pub properties: Vec<AssetProperty>,
}

impl PropertyBinding {
    pub fn is_empty(&self) -> bool {
        self.measurement_uuids.is_empty()
    }

    fn bind(&mut self, property: &AssetProperty) {
        let Some(measurement) = property.measurement_uuid else { return };
        if !self.measurement_uuids.contains(&measurement) {
            self.measurement_uuids.push(measurement);
        }
        self.properties.push(property.clone());
    }
}

/// Bind selectors (property names or UUIDs) per asset
///
/// Stops once `series_limit` distinct measurements are bound.
pub fn bind_asset_properties(
    assets: &[Uuid],
    properties: &[AssetProperty],
    selectors: &[String],
    series_limit: usize,
) -> PropertyBinding {
    let mut by_asset: AHashMap<Uuid, AHashMap<String, &AssetProperty>> = AHashMap::new();
    for property in properties {
        let keys = by_asset.entry(property.asset_uuid).or_default();
        keys.insert(property.name.clone(), property);
        keys.insert(property.uuid.to_string(), property);
    }

    let mut binding = PropertyBinding::default();
    for asset in assets {
        let Some(keys) = by_asset.get(asset) else { continue };
        for selector in selectors {
            if let Some(property) = keys.get(selector) {
                binding.bind(property);
                if binding.measurement_uuids.len() >= series_limit {
                    return binding;
                }
            }
        }
    }
    binding
}

/// Run an asset-measurement query
pub async fn handle_asset_measurement_query(
    ctx: &QueryContext,
    query: &AssetMeasurementQuery,
    range: &TimeRange,
    interval: Duration,
    series_limit: usize,
) -> Result<Vec<Table>, QueryError> {
    let index = AssetIndex::new(ctx.fetch(ctx.api.fetch_assets(&AssetFilter::default())).await?);
    let selected = filter_assets(&index, &query.assets);
    if selected.is_empty() {
        debug!("no assets match {:?}", query.assets);
        return Ok(Vec::new());
    }

    let filter = AssetPropertyFilter {
        asset_uuids: selected.clone(),
    };
    let properties = ctx.fetch(ctx.api.fetch_asset_properties(&filter)).await?;
    let binding = bind_asset_properties(&selected, &properties, &query.asset_properties, series_limit);
    if binding.is_empty() {
        return Ok(Vec::new());
    }

    let measurements = fetch_measurements_by_uuid(ctx, &binding.measurement_uuids).await?;
    let historian_query = HistorianQuery::new(binding.measurement_uuids.clone(), range, interval, &query.options);
    let tables = handle_series_query(ctx, &historian_query, &query.options, &measurements).await?;

    let mut tables = set_asset_names(tables, &binding.properties, &index, NamingOptions::from(&query.options));
    if query.options.metadata_as_labels {
        apply_metadata_labels(&mut tables);
    }
    sort_by_status(&mut tables);
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(asset: Uuid, name: &str, measurement: Option<Uuid>) -> AssetProperty {
        AssetProperty {
            name: name.into(),
            uuid: Uuid::new_v4(),
            asset_uuid: asset,
            measurement_uuid: measurement,
        }
    }

    #[test]
    fn test_bind_by_name_and_uuid() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let properties = vec![property(a, "Speed", Some(m1)), property(b, "Speed", Some(m2))];

        let binding = bind_asset_properties(&[a, b], &properties, &["Speed".to_string()], 10);
        assert_eq!(binding.measurement_uuids, vec![m1, m2]);
        assert_eq!(binding.properties.len(), 2);

        let by_uuid = bind_asset_properties(&[a, b], &properties, &[properties[1].uuid.to_string()], 10);
        assert_eq!(by_uuid.measurement_uuids, vec![m2]);
    }

    #[test]
    fn test_bind_respects_series_limit() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let properties = vec![
            property(a, "Speed", Some(Uuid::new_v4())),
            property(b, "Speed", Some(Uuid::new_v4())),
        ];
        let binding = bind_asset_properties(&[a, b], &properties, &["Speed".to_string()], 1);
        assert_eq!(binding.measurement_uuids.len(), 1);
    }

    #[test]
    fn test_unbound_property_is_skipped() {
        let a = Uuid::new_v4();
        let properties = vec![property(a, "Speed", None)];
        let binding = bind_asset_properties(&[a], &properties, &["Speed".to_string()], 10);
        assert!(binding.is_empty());
        assert!(binding.properties.is_empty());
    }
}
