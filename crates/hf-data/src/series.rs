//! Conversion of raw series into tables

use chrono::DateTime;
use hf_core::{Measurement, QueryResult, SampleValue, Series};
use tracing::debug;

use crate::table::{
    Column, FieldConfig, Labels, Table, Threshold, Thresholds, ThresholdsMode, Value, ValueKind,
    TIME_COLUMN, VALUE_COLUMN,
};

/// Builds one table per series
///
/// Single-value series become a `time` and a `value` column; multi-field
/// series get one column per field name.
#[derive(Debug, Clone, Default)]
pub struct SeriesFrameBuilder<'a> {
    measurement: Option<&'a Measurement>,
    use_engineering_specs: bool,
    executed_query: Option<&'a str>,
}

impl<'a> SeriesFrameBuilder<'a> {
    /// Create a new builder without measurement context
    pub fn new() -> Self {
        Self::default()
    }

    /// Measurement supplying identity, description and engineering specs
    pub fn with_measurement(mut self, measurement: Option<&'a Measurement>) -> Self {
        self.measurement = measurement;
        self
    }

    pub fn with_engineering_specs(mut self, enabled: bool) -> Self {
        self.use_engineering_specs = enabled;
        self
    }

    pub fn with_executed_query(mut self, query: Option<&'a str>) -> Self {
        self.executed_query = query;
        self
    }

    pub fn build(&self, series: &Series) -> Table {
        let labels = string_tags(series);
        let mut table = Table::new(series.measurement.clone());
        self.fill_meta(&mut table, series, &labels);

        let times = series
            .data_points
            .iter()
            .map(|p| DateTime::from_timestamp_millis(p.timestamp).map(Value::Time));
        let mut columns = vec![Column::from_values(TIME_COLUMN, ValueKind::Time, times)];

        if series.is_multi_field() {
            for (index, field) in series.fields.iter().enumerate() {
                let samples: Vec<Option<&SampleValue>> = series
                    .data_points
                    .iter()
                    .map(|p| match &p.value {
                        SampleValue::Array(items) => items.get(index),
                        _ => None,
                    })
                    .collect();
                let column = typed_column(field, samples).with_labels(labels.clone());
                columns.push(column);
            }
        } else {
            let samples = series.data_points.iter().map(|p| Some(&p.value)).collect();
            let column = typed_column(VALUE_COLUMN, samples)
                .with_labels(labels)
                .with_config(field_config(self.measurement, self.use_engineering_specs));
            columns.push(column);
        }

        for column in columns {
            // Every column was built from the same points, so shapes agree.
            if let Err(err) = table.add_column(column) {
                debug!("skipping column of {}: {}", series.measurement, err);
            }
        }
        table
    }

    fn fill_meta(&self, table: &mut Table, series: &Series, labels: &Labels) {
        let meta = &mut table.meta;
        meta.measurement_name = series.measurement.clone();
        meta.database_name = series.database.clone();
        meta.labels = labels.clone();
        meta.executed_query = self.executed_query.map(String::from);

        if let Some(measurement) = self.measurement {
            meta.measurement_uuid = Some(measurement.uuid);
            meta.database_uuid = measurement
                .database_uuid
                .or_else(|| measurement.database.as_ref().map(|db| db.uuid));
            meta.description = measurement.description.clone();
            if meta.database_name.is_empty() {
                meta.database_name = measurement.database_name().unwrap_or_default().to_string();
            }
        }
    }
}

/// String-valued tags; other tag values are not labels
fn string_tags(series: &Series) -> Labels {
    series
        .tags
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

/// Column whose kind is that of the first concrete sample
fn typed_column(name: &str, samples: Vec<Option<&SampleValue>>) -> Column {
    let kind = samples
        .iter()
        .flatten()
        .find_map(|s| Value::sample_kind(s))
        .unwrap_or(ValueKind::Float64);
    let values = samples
        .into_iter()
        .map(|s| s.and_then(Value::from_sample));
    Column::from_values(name, kind, values)
}

/// Field config derived from a measurement
///
/// Engineering specs come from the measurement's `Config` attribute bag.
/// Thresholds are only set when at least one limit is present.
pub fn field_config(measurement: Option<&Measurement>, use_engineering_specs: bool) -> FieldConfig {
    let mut config = FieldConfig {
        unit: Some("none".to_string()),
        description: measurement
            .map(|m| m.description.clone())
            .filter(|d| !d.is_empty()),
        ..Default::default()
    };

    let specs = match measurement.and_then(Measurement::engineering_specs) {
        Some(specs) if use_engineering_specs => specs,
        _ => return config,
    };

    if let Some(uom) = specs.get_str("UoM").filter(|u| !u.is_empty()) {
        config.unit = Some(uom.to_string());
    }
    config.min = specs.get_f64("ValueMin");
    config.max = specs.get_f64("ValueMax");

    let mut steps = vec![Threshold::new(None, "red")];
    if let Some(lo) = specs.get_f64("LimitLo") {
        steps.push(Threshold::new(Some(lo), "green"));
    }
    if let Some(hi) = specs.get_f64("LimitHi") {
        steps.push(Threshold::new(Some(hi), "red"));
    }
    if steps.len() > 1 {
        config.thresholds = Some(Thresholds {
            mode: ThresholdsMode::Absolute,
            steps,
        });
    }
    config
}

/// Tables for every series of a query result
///
/// Each series is matched to its measurement by name, and by database name
/// when both sides know it.
pub fn query_result_to_tables(
    result: &QueryResult,
    measurements: &[Measurement],
    use_engineering_specs: bool,
) -> Vec<Table> {
    result
        .series
        .iter()
        .map(|series| {
            let measurement = measurements.iter().find(|m| {
                m.name == series.measurement
                    && match (m.database_name(), series.database.as_str()) {
                        (Some(db), name) if !name.is_empty() => db == name,
                        _ => true,
                    }
            });
            SeriesFrameBuilder::new()
                .with_measurement(measurement)
                .with_engineering_specs(use_engineering_specs)
                .with_executed_query(result.executed_query.as_deref())
                .build(series)
        })
        .collect()
}
