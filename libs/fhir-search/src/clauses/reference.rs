use crate::bind::{push_text, BindValue};
use crate::params::SearchValue;

use super::join_or;

/// Reference search: equality on the stored `<Type>/<id>` value.
pub(crate) fn build_reference_clause(
    column: &str,
    values: &[SearchValue],
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for v in values {
        if v.raw.is_empty() {
            continue;
        }
        let idx = push_text(bind_params, v.raw.clone());
        parts.push(format!("{} = ${}", column, idx));
    }
    join_or(parts)
}
