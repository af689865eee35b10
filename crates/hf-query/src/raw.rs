//! Raw query text run verbatim against a time-series database

use std::time::Duration;

use hf_core::query::INTERVAL_VARIABLE;
use hf_core::{RawQuery, TimeRange};
use hf_data::naming::set_measurement_names;
use hf_data::series::query_result_to_tables;
use hf_data::{NamingOptions, Table};

use crate::context::QueryContext;
use crate::QueryError;

const TIME_FILTER_VARIABLE: &str = "$timeFilter";

/// Substitute `$timeFilter` and `$__interval` with nanosecond literals
pub fn fill_query_variables(query: &str, range: &TimeRange, interval: Duration) -> String {
    let from = range.from.timestamp_nanos_opt().unwrap_or_default();
    let to = range.to.timestamp_nanos_opt().unwrap_or_default();
    let interval = i64::try_from(interval.as_nanos()).unwrap_or(i64::MAX);
    let offset = if interval > 0 { from.rem_euclid(interval) } else { 0 };

    let time_filter = format!("time >= {from}ns AND time < {to}ns");
    let group = format!("TIME({interval}ns, {offset}ns)");
    query
        .replace(TIME_FILTER_VARIABLE, &time_filter)
        .replace(INTERVAL_VARIABLE, &group)
}

pub async fn handle_raw_query(
    ctx: &QueryContext,
    query: &RawQuery,
    range: &TimeRange,
    interval: Duration,
) -> Result<Vec<Table>, QueryError> {
    let text = fill_query_variables(&query.query, range, interval);
    let result = ctx
        .fetch(ctx.api.run_raw_query(&query.timeseries_database, &text))
        .await?;

    let mut tables = query_result_to_tables(&result, &[], false);
    set_measurement_names(&mut tables, NamingOptions::default());
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_fill_query_variables() {
        let range = TimeRange::new(
            Utc.timestamp_opt(90, 0).unwrap(),
            Utc.timestamp_opt(150, 0).unwrap(),
        );
        let text = fill_query_variables(
            "SELECT mean(value) FROM temp WHERE $timeFilter GROUP BY $__interval",
            &range,
            Duration::from_secs(60),
        );
        assert_eq!(
            text,
            "SELECT mean(value) FROM temp WHERE time >= 90000000000ns AND time < 150000000000ns \
             GROUP BY TIME(60000000000ns, 30000000000ns)"
        );
    }

    #[test]
    fn test_zero_interval() {
        let range = TimeRange::new(Utc.timestamp_opt(90, 0).unwrap(), Utc.timestamp_opt(150, 0).unwrap());
        let text = fill_query_variables("$__interval", &range, Duration::ZERO);
        assert_eq!(text, "TIME(0ns, 0ns)");
    }
}
