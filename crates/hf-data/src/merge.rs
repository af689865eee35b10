//! Merging of table sets by series identity

use ahash::AHashMap;
use tracing::debug;

use crate::table::{Table, TableIdentity};

/// Merge `incoming` into `known`
///
/// Tables with the same identity are merged by appending the incoming rows,
/// provided both have the same column count and column kinds; otherwise the
/// incoming table is dropped. Unmatched incoming tables are appended after
/// the known tables.
pub fn merge_tables(known: Vec<Table>, incoming: Vec<Table>) -> Vec<Table> {
    if known.is_empty() {
        return incoming;
    }
    if incoming.is_empty() {
        return known;
    }

    let mut merged = known;
    let mut index: AHashMap<TableIdentity, usize> = AHashMap::new();
    for (position, table) in merged.iter().enumerate() {
        index.entry(table.identity()).or_insert(position);
    }

    for table in incoming {
        let identity = table.identity();
        let Some(position) = index.get(&identity).copied() else {
            index.insert(identity, merged.len());
            merged.push(table);
            continue;
        };

        let target = &mut merged[position];
        if target.kinds() != table.kinds() {
            debug!("dropping {}: schema differs from the table it merges into", identity);
            continue;
        }

        if let Err(err) = target.extend_rows(&table) {
            debug!("dropping {}: {}", identity, err);
            continue;
        }
        target.meta.executed_query = join_queries(
            target.meta.executed_query.take(),
            table.meta.executed_query,
        );
    }

    merged
}

/// Keep the first table of every identity
pub fn dedupe_by_identity(tables: Vec<Table>) -> Vec<Table> {
    let mut seen = ahash::AHashSet::new();
    tables
        .into_iter()
        .filter(|t| seen.insert(t.identity()))
        .collect()
}

fn join_queries(left: Option<String>, right: Option<String>) -> Option<String> {
    match (left, right) {
        (Some(l), Some(r)) => Some(format!("{l}; {r}")),
        (l, r) => l.or(r),
    }
}
