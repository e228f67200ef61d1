use crate::bind::{push_text, BindValue};
use crate::params::{SearchPrefix, SearchValue};

use super::join_or;

fn format_number(value: f64) -> String {
    // Trim float noise: ten significant decimal places, then strip zeros
    let mut s = format!("{:.10}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

/// Number search: the prefix maps to a comparison operator; `ap` expands to
/// a ±10% BETWEEN window.
pub(crate) fn build_number_clause(
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
                let Ok(number) = v.raw.parse::<f64>() else {
                    continue;
                };
                let start_idx = push_text(bind_params, format_number(number * 0.9));
                let end_idx = push_text(bind_params, format_number(number * 1.1));
                parts.push(format!("{} BETWEEN ${} AND ${}", column, start_idx, end_idx));
            }
        }
    }
    join_or(parts)
}
