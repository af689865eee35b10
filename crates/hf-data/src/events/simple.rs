//! One wide table per event type

use std::collections::BTreeMap;

use hf_core::{Event, EventTypeProperty};
use tracing::debug;
use uuid::Uuid;

use super::*;
use crate::table::{Column, FieldConfig, Table, Value, ValueKind, DURATION_UNIT, VALUE_COLUMN};
use crate::DataError;

/// Columns describing one event, optionally prefixed
struct EventBlock<'a> {
    prefix: &'static str,
    properties: Vec<(&'a EventTypeProperty, ValueKind)>,
}

impl<'a> EventBlock<'a> {
    /// Block over the non-periodic, selected properties of an event type
    fn new(
        prefix: &'static str,
        input: &EventFrameInput<'a>,
        event_type: &Uuid,
        skip: &[String],
    ) -> Self {
        let properties = input
            .properties_of(event_type)
            .iter()
            .filter(|p| !p.property_type.is_periodic())
            .filter(|p| p.is_selected(input.selected))
            .filter(|p| !skip.contains(&p.name))
            .map(|p| (*p, property_kind(&p.datatype).unwrap_or(ValueKind::String)))
            .collect();
        Self { prefix, properties }
    }

    fn name(&self, column: &str) -> String {
        format!("{}{}", self.prefix, column)
    }

    fn columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = [
            EVENT_UUID_COLUMN,
            PARENT_EVENT_UUID_COLUMN,
            ASSET_UUID_COLUMN,
            EVENT_TYPE_UUID_COLUMN,
            ASSET_COLUMN,
            ASSET_PATH_COLUMN,
            EVENT_TYPE_COLUMN,
        ]
        .into_iter()
        .map(|name| Column::new(self.name(name), ValueKind::String))
        .collect();

        columns.push(Column::new(self.name(START_TIME_COLUMN), ValueKind::Time));
        columns.push(Column::new(self.name(STOP_TIME_COLUMN), ValueKind::Time));
        columns.push(
            Column::new(self.name(DURATION_COLUMN), ValueKind::Float64)
                .with_config(FieldConfig::with_unit(DURATION_UNIT)),
        );

        for (property, kind) in &self.properties {
            let mut column = Column::new(self.name(&property.name), *kind);
            if !property.uom.is_empty() {
                column = column.with_config(FieldConfig::with_unit(property.uom.clone()));
            }
            columns.push(column);
        }
        columns
    }

    fn width(&self) -> usize {
        10 + self.properties.len()
    }

    fn row(&self, input: &EventFrameInput<'_>, event: &Event) -> Vec<Option<Value>> {
        let mut row = vec![
            Some(Value::String(event.uuid.to_string())),
            event.parent_uuid.map(|u| Value::String(u.to_string())),
            Some(Value::String(event.asset_uuid.to_string())),
            Some(Value::String(event.event_type_uuid.to_string())),
            Some(Value::String(input.asset_name(&event.asset_uuid))),
            Some(Value::String(input.asset_path(&event.asset_uuid))),
            Some(Value::String(input.event_type_name(&event.event_type_uuid))),
            Some(Value::Time(event.start_time)),
            event.stop_time.map(Value::Time),
            event.duration_secs().map(Value::Float64),
        ];

        for (property, kind) in &self.properties {
            let value = event.property(&property.name).and_then(|v| {
                if property_kind(&property.datatype).is_some() {
                    Value::from_json(v, *kind)
                } else {
                    Value::json_to_string(v).map(Value::String)
                }
            });
            row.push(value);
        }
        row
    }

    fn null_row(&self) -> Vec<Option<Value>> {
        vec![None; self.width()]
    }
}

/// Kind of every asset property surfaced by the side tables
///
/// Disagreeing occurrences fall back to `String`.
fn asset_property_kinds(input: &EventFrameInput<'_>) -> BTreeMap<String, ValueKind> {
    let mut kinds: BTreeMap<String, ValueKind> = BTreeMap::new();
    for table in input.side_tables.values().flatten() {
        let name = &table.meta.asset_property;
        let Some(column) = table.value_column() else { continue };
        if name.is_empty() {
            continue;
        }
        kinds
            .entry(name.clone())
            .and_modify(|k| {
                if *k != column.kind() {
                    *k = ValueKind::String;
                }
            })
            .or_insert(column.kind());
    }
    kinds
}

/// First value of the named asset property's side table for an event
fn asset_property_value(
    input: &EventFrameInput<'_>,
    event: &Event,
    name: &str,
    kind: ValueKind,
) -> Option<Value> {
    let value = input
        .side_tables_of(&event.uuid)
        .iter()
        .filter(|t| t.meta.asset_property == name)
        .find_map(|t| t.column(VALUE_COLUMN))?
        .get(0)?;

    if value.kind() == kind {
        Some(value.clone())
    } else if kind == ValueKind::String {
        Some(Value::String(value.to_string()))
    } else {
        None
    }
}

/// One table per event type, in order of first appearance
pub fn simple_event_tables(input: &EventFrameInput<'_>) -> Result<Vec<Table>, DataError> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: ahash::AHashMap<Uuid, Vec<&Event>> = ahash::AHashMap::new();
    for event in input.events {
        let group = grouped.entry(event.event_type_uuid).or_default();
        if group.is_empty() {
            order.push(event.event_type_uuid);
        }
        group.push(event);
    }

    let asset_kinds = asset_property_kinds(input);
    let mut tables = Vec::with_capacity(order.len());
    for event_type in order {
        let events = grouped.remove(&event_type).unwrap_or_default();
        tables.push(event_type_table(input, &event_type, &events, &asset_kinds)?);
    }
    Ok(tables)
}

fn event_type_table(
    input: &EventFrameInput<'_>,
    event_type: &Uuid,
    events: &[&Event],
    asset_kinds: &BTreeMap<String, ValueKind>,
) -> Result<Table, DataError> {
    let asset_names: Vec<String> = asset_kinds.keys().cloned().collect();
    let primary = EventBlock::new("", input, event_type, &asset_names);

    // The first parent with a known event type decides the parent block.
    let parent_type = input
        .include_parent_info
        .then(|| {
            events
                .iter()
                .filter_map(|e| e.parent.as_deref())
                .map(|p| p.event_type_uuid)
                .find(|t| input.event_type(t).is_some())
        })
        .flatten();
    let parent = parent_type.map(|t| (t, EventBlock::new(PARENT_PREFIX, input, &t, &[])));

    let mut columns = Vec::new();
    if let Some((_, block)) = &parent {
        columns.extend(block.columns());
    }
    columns.extend(primary.columns());
    let mut asset_columns = Vec::new();
    for (name, kind) in asset_kinds {
        if columns.iter().any(|c| &c.name == name) {
            debug!("asset property {} collides with an event column", name);
            continue;
        }
        columns.push(Column::new(name.clone(), *kind));
        asset_columns.push((name.clone(), *kind));
    }

    let name = input
        .event_type(event_type)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| event_type.to_string());
    let mut table = Table::with_columns(name, columns)?;

    for event in events {
        let mut row = Vec::with_capacity(table.column_count());
        if let Some((parent_type, block)) = &parent {
            match event.parent.as_deref() {
                Some(p) if p.event_type_uuid == *parent_type => row.extend(block.row(input, p)),
                _ => row.extend(block.null_row()),
            }
        }
        row.extend(primary.row(input, event));
        for (name, kind) in &asset_columns {
            row.push(asset_property_value(input, event, name, *kind));
        }
        table.append_row(row)?;
    }
    Ok(table)
}
