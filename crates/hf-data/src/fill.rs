//! Filling of the leading gap of a query window

use chrono::{DateTime, Utc};
use hf_core::query::parse_period;
use tracing::debug;

use crate::table::{Table, Value, TIME_COLUMN, VALUE_COLUMN};

/// Fill the start of each table's window with its last known value
///
/// A table holding only a last known point gets one synthesized row per
/// aggregation period from `start` up to (excluding) `end`, so a window
/// that is not a multiple of the period still gets a row in its last partial
/// period: `ceil((end - start) / period)` rows in total. A longer table
/// has the nulls following its first row forward-filled up to the first
/// concrete value. Without an end time or a parsable period nothing changes.
pub fn fill_initial_empty_values(
    tables: &mut [Table],
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    period: Option<&str>,
) {
    let Some(end) = end else { return };
    let Some(step) = period
        .and_then(parse_period)
        .and_then(|p| chrono::Duration::from_std(p).ok())
    else {
        return;
    };

    for table in tables.iter_mut() {
        match table.value_column().map(|c| c.len()) {
            None | Some(0) => continue,
            Some(1) => synthesize_rows(table, start, end, step),
            Some(_) => forward_fill(table),
        }
    }
}

fn synthesize_rows(table: &mut Table, start: DateTime<Utc>, end: DateTime<Utc>, step: chrono::Duration) {
    let Some(value) = table.value_column().and_then(|c| c.get(0)).cloned() else {
        return;
    };

    let mut time = start;
    let mut added = 0usize;
    while time < end {
        let row = table
            .column_names()
            .into_iter()
            .map(|name| match name {
                TIME_COLUMN => Some(Value::Time(time)),
                VALUE_COLUMN => Some(value.clone()),
                _ => None,
            })
            .collect();
        if let Err(err) = table.append_row(row) {
            debug!("stopping gap fill of {}: {}", table.name, err);
            return;
        }
        added += 1;
        time += step;
    }
    debug!("filled {} rows into {}", added, table.name);
}

fn forward_fill(table: &mut Table) {
    let Some(column) = table.value_column_mut() else { return };
    let Some(first) = column.get(0).cloned() else { return };

    for row in 1..column.len() {
        if column.get(row).is_some() {
            break;
        }
        column.set(row, Some(first.clone()));
    }
}

/// Remove the last known point of tables that received one
pub fn delete_leading_points(tables: &mut [Table]) {
    for table in tables.iter_mut().filter(|t| t.meta.leading_point) {
        if table.row_count() > 0 {
            table.delete_row(0);
        }
        table.meta.leading_point = false;
    }
}
