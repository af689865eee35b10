//! Display names and labels of result tables

use hf_core::{AssetIndex, AssetProperty, QueryOptions, ASSET_PATH_SEPARATOR};

use crate::table::{Labels, Table, TIME_COLUMN, VALUE_COLUMN};

/// Label a table needs to sort ahead of the others
const PREFERRED_STATUS: &str = "Good";

/// Which optional metadata is appended to display names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingOptions {
    pub display_description: bool,
    pub display_database_name: bool,
}

impl From<&QueryOptions> for NamingOptions {
    fn from(options: &QueryOptions) -> Self {
        Self {
            display_description: options.display_description,
            display_database_name: options.display_database_name,
        }
    }
}

/// ` {k: v, Description: d, Database: db}`, or nothing when empty
pub fn label_suffix(labels: &Labels, description: &str, database: &str, options: NamingOptions) -> String {
    let mut parts: Vec<String> = labels.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    if options.display_description && !description.is_empty() {
        parts.push(format!("Description: {description}"));
    }
    if options.display_database_name && !database.is_empty() {
        parts.push(format!("Database: {database}"));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" {{{}}}", parts.join(", "))
    }
}

fn table_suffix(table: &Table, options: NamingOptions) -> String {
    let meta = &table.meta;
    label_suffix(&meta.labels, &meta.description, &meta.database_name, options)
}

/// Name a table and its data columns after `base`
///
/// The `value` column gets `base`, other fields `base.field`.
fn apply_display_name(table: &mut Table, base: &str, suffix: &str) {
    table.name = format!("{base}{suffix}");
    for column in table.data_columns_mut() {
        let display = if column.name == VALUE_COLUMN {
            format!("{base}{suffix}")
        } else {
            format!("{base}.{}{suffix}", column.name)
        };
        column.config_mut().display_name = Some(display);
    }
}

/// `<measurement><suffix>` naming
pub fn set_measurement_names(tables: &mut [Table], options: NamingOptions) {
    for table in tables.iter_mut() {
        let base = if table.meta.measurement_name.is_empty() {
            table.name.clone()
        } else {
            table.meta.measurement_name.clone()
        };
        let suffix = table_suffix(table, options);
        apply_display_name(table, &base, &suffix);
    }
}

/// `<asset path>\<property><suffix>` naming
///
/// Each table is used as a template and cloned once per asset property
/// bound to its measurement. Tables no property points at keep measurement
/// naming.
pub fn set_asset_names(
    tables: Vec<Table>,
    properties: &[AssetProperty],
    assets: &AssetIndex,
    options: NamingOptions,
) -> Vec<Table> {
    let mut named = Vec::with_capacity(tables.len());
    for template in tables {
        let bound: Vec<&AssetProperty> = properties
            .iter()
            .filter(|p| p.measurement_uuid.is_some() && p.measurement_uuid == template.meta.measurement_uuid)
            .collect();

        if bound.is_empty() {
            let mut table = template;
            set_measurement_names(std::slice::from_mut(&mut table), options);
            named.push(table);
            continue;
        }

        for property in bound {
            let mut table = template.clone();
            let asset = assets.get(&property.asset_uuid);
            let path = assets
                .path(&property.asset_uuid)
                .unwrap_or_default();

            let meta = &mut table.meta;
            meta.asset_uuid = Some(property.asset_uuid);
            meta.asset_name = asset.map(|a| a.name.clone()).unwrap_or_default();
            meta.asset_path = path.clone();
            meta.asset_property = property.name.clone();
            meta.asset_property_uuid = Some(property.uuid);

            let base = format!("{path}{ASSET_PATH_SEPARATOR}{}", property.name);
            let suffix = table_suffix(&table, options);
            apply_display_name(&mut table, &base, &suffix);
            named.push(table);
        }
    }
    named
}

/// Copy identity metadata onto the labels of every data column
pub fn apply_metadata_labels(tables: &mut [Table]) {
    for table in tables.iter_mut() {
        let meta = &table.meta;
        let uuid = |u: Option<uuid::Uuid>| u.map(|u| u.to_string()).unwrap_or_default();
        let fields = [
            ("MeasurementUUID", uuid(meta.measurement_uuid)),
            ("Measurement", meta.measurement_name.clone()),
            ("DatabaseUUID", uuid(meta.database_uuid)),
            ("Database", meta.database_name.clone()),
            ("AssetUUID", uuid(meta.asset_uuid)),
            ("Asset", meta.asset_name.clone()),
            ("AssetPath", meta.asset_path.clone()),
            ("Description", meta.description.clone()),
        ];

        for column in table.columns_mut().filter(|c| c.name != TIME_COLUMN) {
            for (key, value) in fields.iter().filter(|(_, v)| !v.is_empty()) {
                column.labels.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// Stable sort putting tables labeled `status=Good` first
pub fn sort_by_status(tables: &mut [Table]) {
    tables.sort_by_key(|t| t.meta.labels.get("status").map(String::as_str) != Some(PREFERRED_STATUS));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value, ValueKind};
    use hf_core::Asset;
    use uuid::Uuid;

    fn table(measurement: &str, status: Option<&str>) -> Table {
        let mut table = Table::with_columns(
            measurement,
            vec![
                Column::from_values(TIME_COLUMN, ValueKind::Int64, vec![Some(Value::Int64(0))]),
                Column::from_values(VALUE_COLUMN, ValueKind::Float64, vec![Some(Value::Float64(1.0))]),
            ],
        )
        .unwrap();
        table.meta.measurement_name = measurement.to_string();
        if let Some(status) = status {
            table.meta.labels.insert("status".into(), status.into());
        }
        table
    }

    fn display(table: &Table) -> Option<String> {
        table.value_column()?.display_name().map(String::from)
    }

    #[test]
    fn test_measurement_name_with_labels() {
        let mut tables = vec![table("Temp", Some("Good"))];
        set_measurement_names(&mut tables, NamingOptions::default());

        assert_eq!(display(&tables[0]).as_deref(), Some("Temp {status: Good}"));
        assert_eq!(tables[0].name, "Temp {status: Good}");
        assert!(tables[0].time_column().unwrap().display_name().is_none());
    }

    #[test]
    fn test_suffix_flags() {
        let labels = Labels::from([("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())]);
        let all = NamingOptions {
            display_description: true,
            display_database_name: true,
        };

        assert_eq!(
            label_suffix(&labels, "Oven", "influx", all),
            " {a: 1, b: 2, Description: Oven, Database: influx}"
        );
        assert_eq!(label_suffix(&Labels::new(), "", "influx", NamingOptions::default()), "");
        assert_eq!(label_suffix(&Labels::new(), "", "", all), "");
    }

    #[test]
    fn test_asset_names_clone_per_property() {
        let site = Asset {
            name: "Site".into(),
            uuid: Uuid::new_v4(),
            ..Default::default()
        };
        let pump = Asset {
            name: "Pump".into(),
            uuid: Uuid::new_v4(),
            parent_uuid: Some(site.uuid),
            ..Default::default()
        };
        let measurement = Uuid::new_v4();
        let properties = vec![
            AssetProperty {
                name: "Flow".into(),
                uuid: Uuid::new_v4(),
                asset_uuid: pump.uuid,
                measurement_uuid: Some(measurement),
            },
            AssetProperty {
                name: "Throughput".into(),
                uuid: Uuid::new_v4(),
                asset_uuid: site.uuid,
                measurement_uuid: Some(measurement),
            },
        ];
        let assets = AssetIndex::new(vec![site, pump]);

        let mut bound = table("flow", None);
        bound.meta.measurement_uuid = Some(measurement);
        let unbound = table("other", None);

        let named = set_asset_names(vec![bound, unbound], &properties, &assets, NamingOptions::default());
        assert_eq!(named.len(), 3);
        assert_eq!(display(&named[0]).as_deref(), Some("Site\\Pump\\Flow"));
        assert_eq!(display(&named[1]).as_deref(), Some("Site\\Throughput"));
        assert_eq!(named[0].meta.asset_property, "Flow");
        assert_eq!(named[1].meta.asset_name, "Site");
        assert_eq!(display(&named[2]).as_deref(), Some("other"));
    }

    #[test]
    fn test_multi_field_display_names() {
        let mut t = Table::with_columns(
            "motor",
            vec![
                Column::from_values(TIME_COLUMN, ValueKind::Int64, vec![Some(Value::Int64(0))]),
                Column::from_values("speed", ValueKind::Float64, vec![None]),
            ],
        )
        .unwrap();
        t.meta.measurement_name = "motor".into();

        set_measurement_names(std::slice::from_mut(&mut t), NamingOptions::default());
        assert_eq!(t.column("speed").unwrap().display_name(), Some("motor.speed"));
    }

    #[test]
    fn test_metadata_labels() {
        let mut t = table("Temp", Some("Good"));
        t.meta.description = "Oven".into();
        t.meta.asset_path = "Site\\Oven".into();
        let mut tables = vec![t];

        apply_metadata_labels(&mut tables);
        let labels = &tables[0].value_column().unwrap().labels;
        assert_eq!(labels.get("Measurement").map(String::as_str), Some("Temp"));
        assert_eq!(labels.get("Description").map(String::as_str), Some("Oven"));
        assert_eq!(labels.get("AssetPath").map(String::as_str), Some("Site\\Oven"));
        assert!(!labels.contains_key("AssetUUID"));
        assert!(tables[0].time_column().unwrap().labels.is_empty());
    }

    #[test]
    fn test_sort_by_status_is_stable() {
        let mut tables = vec![
            table("a", Some("Bad")),
            table("b", Some("Good")),
            table("c", None),
            table("d", Some("Good")),
        ];
        sort_by_status(&mut tables);

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "a", "c"]);
    }
}
