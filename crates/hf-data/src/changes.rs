//! Suppression of consecutive duplicate samples

use crate::table::Table;

/// Drop rows whose value repeats the previous concrete value
///
/// Null rows are kept and do not reset the comparison. The first concrete
/// row is always kept.
pub fn keep_changes_only(tables: &mut [Table]) {
    for table in tables.iter_mut() {
        let Some(column) = table.value_column() else { continue };

        let mut previous = None;
        let mut repeated = Vec::new();
        for (row, value) in column.values().iter().enumerate() {
            let Some(value) = value else { continue };
            if previous == Some(value) {
                repeated.push(row);
            } else {
                previous = Some(value);
            }
        }

        for row in repeated.into_iter().rev() {
            table.delete_row(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value, ValueKind};

    fn table(values: Vec<Option<&str>>) -> Table {
        let rows = values.len();
        Table::with_columns(
            "state",
            vec![
                Column::from_values("time", ValueKind::Int64, (0..rows).map(|i| Some(Value::Int64(i as i64)))),
                Column::from_values("value", ValueKind::String, values.into_iter().map(|v| v.map(Value::from))),
            ],
        )
        .unwrap()
    }

    fn rows(table: &Table) -> Vec<(i64, Option<String>)> {
        (0..table.row_count())
            .map(|i| {
                let row = table.row(i);
                let time = match &row[0] {
                    Some(Value::Int64(t)) => *t,
                    _ => -1,
                };
                (time, row[1].as_ref().map(Value::to_string))
            })
            .collect()
    }

    #[test]
    fn test_repeats_removed() {
        let mut tables = vec![table(vec![Some("on"), Some("on"), Some("off"), Some("off"), Some("on")])];
        keep_changes_only(&mut tables);

        assert_eq!(
            rows(&tables[0]),
            vec![(0, Some("on".into())), (2, Some("off".into())), (4, Some("on".into()))]
        );
    }

    #[test]
    fn test_nulls_kept_and_skipped() {
        let mut tables = vec![table(vec![None, Some("on"), None, Some("on"), Some("off")])];
        keep_changes_only(&mut tables);

        assert_eq!(
            rows(&tables[0]),
            vec![(0, None), (1, Some("on".into())), (2, None), (4, Some("off".into()))]
        );
    }

    #[test]
    fn test_adjacent_retained_values_differ() {
        let input = vec!["a", "a", "b", "a", "a", "a", "c", "c"];
        let mut tables = vec![table(input.into_iter().map(Some).collect())];
        keep_changes_only(&mut tables);

        let kept: Vec<_> = rows(&tables[0]).into_iter().filter_map(|(_, v)| v).collect();
        assert_eq!(kept, vec!["a", "b", "a", "c"]);
        assert!(kept.windows(2).all(|w| w[0] != w[1]));
    }
}
