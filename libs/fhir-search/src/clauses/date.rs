use chrono::{DateTime, Duration, NaiveDate};

use crate::bind::{push_text, BindValue};
use crate::params::{SearchPrefix, SearchValue};

use super::join_or;

/// The ±1 day window around a date search value, rendered in the value's
/// own precision.
fn approximate_window(raw: &str) -> (String, String) {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return (
            (date - Duration::days(1)).format("%Y-%m-%d").to_string(),
            (date + Duration::days(1)).format("%Y-%m-%d").to_string(),
        );
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return (
            (instant - Duration::days(1)).to_rfc3339(),
            (instant + Duration::days(1)).to_rfc3339(),
        );
    }
    // Unparseable values degrade to a zero-width window
    (raw.to_string(), raw.to_string())
}

/// Date search: the prefix maps to a comparison operator; `ap` expands to a
/// BETWEEN window of ±1 day.
pub(crate) fn build_date_clause(
    column: &str,
    values: &[SearchValue],
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for v in values {
        if v.raw.is_empty() {
            continue;
        }
        let prefix = v.prefix.unwrap_or(SearchPrefix::Eq);
        match prefix.sql_operator() {
            Some(op) => {
                let idx = push_text(bind_params, v.raw.clone());
                parts.push(format!("{} {} ${}", column, op, idx));
            }
            None => {
                let (start, end) = approximate_window(&v.raw);
                let start_idx = push_text(bind_params, start);
                let end_idx = push_text(bind_params, end);
                parts.push(format!("{} BETWEEN ${} AND ${}", column, start_idx, end_idx));
            }
        }
    }
    join_or(parts)
}
