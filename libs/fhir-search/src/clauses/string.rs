use crate::bind::{push_text, BindValue};
use crate::params::{SearchModifier, SearchValue};

use super::{escape_like_pattern, join_or};

/// String search: default is case-insensitive starts-with, `:exact` is
/// equality, `:contains` matches anywhere.
pub(crate) fn build_string_clause(
    column: &str,
    modifier: Option<&SearchModifier>,
    values: &[SearchValue],
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for v in values {
        if v.raw.is_empty() {
            continue;
        }
        match modifier {
            Some(SearchModifier::Exact) => {
                let idx = push_text(bind_params, v.raw.clone());
                parts.push(format!("{} = ${}", column, idx));
            }
            Some(SearchModifier::Contains) => {
                let pattern = format!("%{}%", escape_like_pattern(&v.raw.to_lowercase()));
                let idx = push_text(bind_params, pattern);
                parts.push(format!("LOWER({}) LIKE ${}", column, idx));
            }
            _ => {
                let pattern = format!("{}%", escape_like_pattern(&v.raw.to_lowercase()));
                let idx = push_text(bind_params, pattern);
                parts.push(format!("LOWER({}) LIKE ${}", column, idx));
            }
        }
    }
    join_or(parts)
}
