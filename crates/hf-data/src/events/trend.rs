//! Offset-indexed pivot of periodic values

use std::collections::{BTreeMap, HashSet};

use ahash::AHashMap;
use hf_core::{Event, EventTypeProperty, PropertyType};
use ordered_float::OrderedFloat;
use uuid::Uuid;

use super::*;
use crate::naming::{label_suffix, NamingOptions};
use crate::table::{Column, FieldConfig, Labels, Table, Value, DURATION_UNIT, TIME_COLUMN, VALUE_COLUMN};
use crate::DataError;

type Offset = OrderedFloat<f64>;

/// What a pivot column carries for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ColumnKey {
    Periodic { property: Uuid, event: Uuid },
    Side { event: Uuid, table: usize },
}

/// Values of all pivot columns keyed by offset
#[derive(Default)]
struct Pivot {
    columns: Vec<Column>,
    keys: AHashMap<ColumnKey, usize>,
    names: HashSet<String>,
    cells: BTreeMap<Offset, AHashMap<usize, Value>>,
}

impl Pivot {
    /// Register a column under its key and return its index
    ///
    /// A taken name is qualified with `qualifier`, then numbered.
    fn add_column(&mut self, key: ColumnKey, mut column: Column, qualifier: &str) -> usize {
        if let Some(&index) = self.keys.get(&key) {
            return index;
        }
        column.name = self.unique_name(column.name, qualifier);
        self.names.insert(column.name.clone());
        self.columns.push(column);
        let index = self.columns.len() - 1;
        self.keys.insert(key, index);
        index
    }

    fn unique_name(&self, name: String, qualifier: &str) -> String {
        if !self.names.contains(&name) {
            return name;
        }
        let qualified = format!("{name}{qualifier}");
        if !qualifier.is_empty() && !self.names.contains(&qualified) {
            return qualified;
        }
        (2..)
            .map(|n| format!("{qualified} #{n}"))
            .find(|candidate| !self.names.contains(candidate))
            .unwrap_or(qualified)
    }

    fn set(&mut self, offset: f64, column: usize, value: Option<Value>) {
        let cells = self.cells.entry(OrderedFloat(offset)).or_default();
        if let Some(value) = value {
            cells.insert(column, value);
        }
    }

    fn into_table(mut self, by_dimension: bool) -> Result<Table, DataError> {
        let mut offset = Column::from_values(
            OFFSET_COLUMN,
            ValueKind::Float64,
            self.cells.keys().map(|o| Some(Value::Float64(o.0))),
        );
        if !by_dimension {
            offset = offset.with_config(FieldConfig::with_unit(DURATION_UNIT));
        }

        let mut table = Table::new(TREND_TABLE_NAME);
        table.add_column(offset)?;
        for (index, column) in self.columns.iter_mut().enumerate() {
            for cells in self.cells.values_mut() {
                column.push(cells.remove(&index));
            }
        }
        for column in self.columns {
            table.add_column(column)?;
        }
        Ok(table)
    }
}

/// Properties pivoted in this mode, honoring the allow-list
fn is_pivoted(property: &EventTypeProperty, by_dimension: bool, selected: &[String]) -> bool {
    let periodic = match property.property_type {
        PropertyType::Periodic => !by_dimension,
        PropertyType::PeriodicWithDimension => true,
        PropertyType::Simple => false,
    };
    periodic && property.is_selected(selected)
}

fn event_labels(input: &EventFrameInput<'_>, event: &Event) -> Labels {
    let mut labels = Labels::new();
    for property in input.properties_of(&event.event_type_uuid) {
        if property.property_type != PropertyType::Simple {
            continue;
        }
        if let Some(value) = event.property(&property.name) {
            labels.insert(property.name.clone(), label_value(value));
        }
    }

    labels.insert(ASSET_PATH_COLUMN.into(), input.asset_path(&event.asset_uuid));
    labels.insert(ASSET_COLUMN.into(), input.asset_name(&event.asset_uuid));
    labels.insert(EVENT_TYPE_COLUMN.into(), input.event_type_name(&event.event_type_uuid));
    labels.insert(START_TIME_COLUMN.into(), format_time(&event.start_time));
    labels.insert(
        STOP_TIME_COLUMN.into(),
        event.stop_time.as_ref().map(format_time).unwrap_or_default(),
    );
    labels.insert(EVENT_UUID_COLUMN.into(), event.uuid.to_string());
    labels.insert(EVENT_TYPE_UUID_COLUMN.into(), event.event_type_uuid.to_string());
    labels.insert(ASSET_UUID_COLUMN.into(), event.asset_uuid.to_string());
    if let Some(parent) = event.parent_uuid {
        labels.insert(PARENT_EVENT_UUID_COLUMN.into(), parent.to_string());
    }
    labels
}

fn parent_labels(input: &EventFrameInput<'_>, parent: &Event, labels: &mut Labels) {
    let key = |name: &str| format!("{PARENT_PREFIX}{name}");
    labels.insert(key(EVENT_UUID_COLUMN), parent.uuid.to_string());
    labels.insert(key(START_TIME_COLUMN), format_time(&parent.start_time));
    labels.insert(
        key(STOP_TIME_COLUMN),
        parent.stop_time.as_ref().map(format_time).unwrap_or_default(),
    );
    labels.insert(key(ASSET_UUID_COLUMN), parent.asset_uuid.to_string());
    labels.insert(key(ASSET_COLUMN), input.asset_name(&parent.asset_uuid));
    labels.insert(key(ASSET_PATH_COLUMN), input.asset_path(&parent.asset_uuid));
    labels.insert(key(EVENT_TYPE_UUID_COLUMN), parent.event_type_uuid.to_string());
    labels.insert(key(EVENT_TYPE_COLUMN), input.event_type_name(&parent.event_type_uuid));

    for property in input.properties_of(&parent.event_type_uuid) {
        if property.property_type.is_periodic() {
            continue;
        }
        let value = parent.property(&property.name).map(label_value).unwrap_or_default();
        labels.insert(key(&property.name), value);
    }
}

/// Pivot periodic properties and asset-property series into one table
///
/// Offsets are seconds since event start, or in dimension mode the
/// dimension value recorded at that offset when it is numeric.
pub fn trend_event_table(input: &EventFrameInput<'_>, by_dimension: bool) -> Result<Table, DataError> {
    let mut pivot = Pivot::default();

    for event in input.events {
        let mut labels = event_labels(input, event);
        if input.include_parent_info {
            if let Some(parent) = event.parent.as_deref() {
                parent_labels(input, parent, &mut labels);
            }
        }

        for property in input.properties_of(&event.event_type_uuid) {
            if !is_pivoted(property, by_dimension, input.selected) {
                continue;
            }
            let Some(kind) = property_kind(&property.datatype) else { continue };
            let Some(values) = event.periodic_values(&property.name) else { continue };

            let mut column_labels = labels.clone();
            column_labels.insert(PROPERTY_LABEL.into(), property.name.clone());
            let mut column = Column::new(format!("{} ({})", property.name, event.uuid), kind)
                .with_labels(column_labels);
            if !property.uom.is_empty() {
                column = column.with_config(FieldConfig::with_unit(property.uom.clone()));
            }
            let key = ColumnKey::Periodic {
                property: property.uuid,
                event: event.uuid,
            };
            let index = pivot.add_column(key, column, "");

            for sample in values.samples() {
                let offset = match (&sample.dimension, by_dimension) {
                    (Some(serde_json::Value::Number(n)), true) => n.as_f64().unwrap_or(sample.offset),
                    _ => sample.offset,
                };
                pivot.set(offset, index, Value::from_json(&sample.value, kind));
            }
        }

        for (table, side) in input.side_tables_of(&event.uuid).iter().enumerate() {
            let (Some(times), Some(values)) = (side.column(TIME_COLUMN), side.column(VALUE_COLUMN)) else {
                continue;
            };

            let property = &side.meta.asset_property;
            let mut column_labels = labels.clone();
            column_labels.insert(PROPERTY_LABEL.into(), property.clone());
            for (key, value) in &side.meta.labels {
                column_labels.entry(key.clone()).or_insert_with(|| value.clone());
            }
            let mut column = Column::new(format!("{} ({})", property, event.uuid), values.kind())
                .with_labels(column_labels);
            let config = column.config_mut();
            config.unit = values.config.as_ref().and_then(|c| c.unit.clone());
            config.display_name = values.display_name().map(String::from);
            let qualifier = label_suffix(&side.meta.labels, "", "", NamingOptions::default());
            let index = pivot.add_column(ColumnKey::Side { event: event.uuid, table }, column, &qualifier);

            for (row, time) in times.values().iter().enumerate() {
                let Some(time) = time.as_ref().and_then(Value::as_time) else { continue };
                let offset = (time - event.start_time).num_milliseconds() as f64 / 1000.0;
                pivot.set(offset, index, values.get(row).cloned());
            }
        }
    }

    pivot.into_table(by_dimension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hf_core::{Asset, EventProperties, EventType, PropertyDatatype};
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        assets: AssetIndex,
        event_types: Vec<EventType>,
        properties: Vec<EventTypeProperty>,
        cycle: Uuid,
        asset: Uuid,
    }

    fn fixture() -> Fixture {
        let asset = Asset {
            name: "Press".into(),
            uuid: Uuid::new_v4(),
            ..Default::default()
        };
        let cycle = EventType {
            name: "Cycle".into(),
            uuid: Uuid::new_v4(),
            ..Default::default()
        };
        let property = |name: &str, property_type: PropertyType| EventTypeProperty {
            name: name.into(),
            uuid: Uuid::new_v4(),
            event_type_uuid: cycle.uuid,
            property_type,
            datatype: PropertyDatatype::Number,
            uom: String::new(),
        };

        let mut properties = vec![
            property("Pressure", PropertyType::Periodic),
            property("Force", PropertyType::PeriodicWithDimension),
            property("Operator", PropertyType::Simple),
        ];
        properties[2].datatype = PropertyDatatype::String;

        Fixture {
            assets: AssetIndex::new(vec![asset.clone()]),
            cycle: cycle.uuid,
            asset: asset.uuid,
            properties,
            event_types: vec![cycle],
        }
    }

    fn event(f: &Fixture, properties: serde_json::Value) -> Event {
        Event {
            uuid: Uuid::new_v4(),
            asset_uuid: f.asset,
            event_type_uuid: f.cycle,
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            properties: Some(EventProperties {
                properties: serde_json::from_value(properties).unwrap(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn offsets(table: &Table) -> Vec<f64> {
        table
            .column(OFFSET_COLUMN)
            .unwrap()
            .values()
            .iter()
            .filter_map(|v| v.as_ref().and_then(Value::as_f64))
            .collect()
    }

    #[test]
    fn test_offset_union() {
        let f = fixture();
        let events = vec![
            event(&f, json!({"Pressure": {"t": [0, 10], "v": [1.0, 2.0]}, "Operator": "Ann"})),
            event(&f, json!({"Pressure": {"t": [5, 10], "v": [3.0, 4.0]}})),
        ];
        let side = BTreeMap::new();
        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side);

        let table = trend_event_table(&input, false).unwrap();
        assert_eq!(table.name, "Result");
        assert_eq!(offsets(&table), vec![0.0, 5.0, 10.0]);

        let first = table.column(&format!("Pressure ({})", events[0].uuid)).unwrap();
        assert_eq!(first.values(), &[Some(Value::Float64(1.0)), None, Some(Value::Float64(2.0))]);
        let second = table.column(&format!("Pressure ({})", events[1].uuid)).unwrap();
        assert_eq!(second.values(), &[None, Some(Value::Float64(3.0)), Some(Value::Float64(4.0))]);

        assert_eq!(first.labels.get("Operator").map(String::as_str), Some("Ann"));
        assert_eq!(first.labels.get("Property").map(String::as_str), Some("Pressure"));
        assert_eq!(first.labels.get("StartTime").map(String::as_str), Some("2024-03-01T12:00:00Z"));
        assert_eq!(first.labels.get("StopTime").map(String::as_str), Some(""));
        assert_eq!(
            table.column(OFFSET_COLUMN).unwrap().config.as_ref().and_then(|c| c.unit.as_deref()),
            Some("dtdhms")
        );
    }

    #[test]
    fn test_dimension_mode() {
        let f = fixture();
        let events = vec![event(
            &f,
            json!({
                "Pressure": {"t": [0], "v": [9.0]},
                "Force": {"t": [0, 1], "v": [10.0, 20.0], "d": [2.5, 7.5]}
            }),
        )];
        let side = BTreeMap::new();
        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side);

        let table = trend_event_table(&input, true).unwrap();
        assert_eq!(offsets(&table), vec![2.5, 7.5]);
        // plain periodic properties are not pivoted by dimension
        assert_eq!(table.column_count(), 2);
        assert!(table.column(OFFSET_COLUMN).unwrap().config.is_none());
    }

    #[test]
    fn test_side_tables_folded_by_offset() {
        let f = fixture();
        let events = vec![event(&f, json!({}))];
        let start = events[0].start_time;

        let mut side_table = Table::with_columns(
            "flow",
            vec![
                Column::from_values(
                    TIME_COLUMN,
                    ValueKind::Time,
                    vec![
                        Some(Value::Time(start + chrono::Duration::seconds(30))),
                        Some(Value::Time(start + chrono::Duration::milliseconds(1500))),
                    ],
                ),
                Column::from_values(VALUE_COLUMN, ValueKind::Float64, vec![Some(Value::Float64(1.0)), Some(Value::Float64(2.0))])
                    .with_config(FieldConfig::with_unit("m3/h")),
            ],
        )
        .unwrap();
        side_table.meta.asset_property = "Flow".into();
        let side = BTreeMap::from([(events[0].uuid, vec![side_table])]);

        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side);
        let table = trend_event_table(&input, false).unwrap();

        assert_eq!(offsets(&table), vec![1.5, 30.0]);
        let flow = table.column(&format!("Flow ({})", events[0].uuid)).unwrap();
        assert_eq!(flow.values(), &[Some(Value::Float64(2.0)), Some(Value::Float64(1.0))]);
        assert_eq!(flow.config.as_ref().and_then(|c| c.unit.as_deref()), Some("m3/h"));
        assert_eq!(flow.labels.get("Asset").map(String::as_str), Some("Press"));
    }

    fn side_table(start: chrono::DateTime<Utc>, property: &str, status: &str, value: f64) -> Table {
        let mut table = Table::with_columns(
            property,
            vec![
                Column::from_values(
                    TIME_COLUMN,
                    ValueKind::Time,
                    vec![Some(Value::Time(start + chrono::Duration::seconds(5)))],
                ),
                Column::from_values(VALUE_COLUMN, ValueKind::Float64, vec![Some(Value::Float64(value))]),
            ],
        )
        .unwrap();
        table.meta.asset_property = property.into();
        table.meta.labels.insert("status".into(), status.into());
        table
    }

    #[test]
    fn test_colliding_columns_are_all_kept() {
        let f = fixture();
        let events = vec![event(&f, json!({"Pressure": {"t": [0], "v": [1.0]}}))];
        let start = events[0].start_time;
        let side = BTreeMap::from([(
            events[0].uuid,
            vec![
                side_table(start, "Pressure", "Good", 42.0),
                side_table(start, "Flow", "Good", 7.0),
                side_table(start, "Flow", "Bad", 8.0),
            ],
        )]);

        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side);
        let table = trend_event_table(&input, false).unwrap();

        assert_eq!(offsets(&table), vec![0.0, 5.0]);
        assert_eq!(table.column_count(), 5);

        let ev = events[0].uuid;
        let values = |name: String| table.column(&name).unwrap().values().to_vec();
        assert_eq!(values(format!("Pressure ({ev})")), vec![Some(Value::Float64(1.0)), None]);
        assert_eq!(
            values(format!("Pressure ({ev}) {{status: Good}}")),
            vec![None, Some(Value::Float64(42.0))]
        );
        assert_eq!(values(format!("Flow ({ev})")), vec![None, Some(Value::Float64(7.0))]);
        assert_eq!(
            values(format!("Flow ({ev}) {{status: Bad}}")),
            vec![None, Some(Value::Float64(8.0))]
        );

        let bad = table.column(&format!("Flow ({ev}) {{status: Bad}}")).unwrap();
        assert_eq!(bad.labels.get("status").map(String::as_str), Some("Bad"));
        assert_eq!(bad.labels.get("Property").map(String::as_str), Some("Flow"));
    }

    #[test]
    fn test_repeated_name_without_labels_is_numbered() {
        let f = fixture();
        let events = vec![event(&f, json!({}))];
        let start = events[0].start_time;
        let mut first = side_table(start, "Flow", "", 1.0);
        first.meta.labels.clear();
        let second = first.clone();
        let side = BTreeMap::from([(events[0].uuid, vec![first, second])]);

        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side);
        let table = trend_event_table(&input, false).unwrap();

        let ev = events[0].uuid;
        assert!(table.column(&format!("Flow ({ev})")).is_some());
        assert!(table.column(&format!("Flow ({ev}) #2")).is_some());
    }

    #[test]
    fn test_parent_labels() {
        let f = fixture();
        let parent = event(&f, json!({"Operator": "Bob"}));
        let mut child = event(&f, json!({"Pressure": {"t": [0], "v": [1.0]}}));
        child.parent_uuid = Some(parent.uuid);
        child.parent = Some(Box::new(parent.clone()));
        let events = vec![child];

        let side = BTreeMap::new();
        let input = EventFrameInput::new(&events, &f.assets, &f.event_types, &f.properties, &side)
            .with_parent_info(true);
        let table = trend_event_table(&input, false).unwrap();

        let column = table.column(&format!("Pressure ({})", events[0].uuid)).unwrap();
        assert_eq!(column.labels.get("Parent_Operator").map(String::as_str), Some("Bob"));
        assert_eq!(column.labels.get("Parent_EventUUID"), Some(&parent.uuid.to_string()));
        assert_eq!(column.labels.get("ParentEventUUID"), Some(&parent.uuid.to_string()));
        assert_eq!(column.labels.get("Parent_StopTime").map(String::as_str), Some(""));
    }

    #[test]
    fn test_no_events_gives_offset_only() {
        let f = fixture();
        let side = BTreeMap::new();
        let input = EventFrameInput::new(&[], &f.assets, &f.event_types, &f.properties, &side);

        let table = trend_event_table(&input, false).unwrap();
        assert_eq!(table.column_names(), vec![OFFSET_COLUMN]);
        assert_eq!(table.row_count(), 0);
    }
}
