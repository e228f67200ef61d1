use crate::bind::{push_text, BindValue};
use crate::params::{SearchModifier, SearchValue};
use crate::registry::SearchParameterImpl;

use super::{column_ref, escape_like_pattern, join_or};

/// Shapes a token search value can take.
enum TokenValueShape {
    /// `code` or `system|code`: matches the text array as-is
    Overlap(String),
    /// `system|`: any code within the system
    SystemPrefix(String),
}

fn parse_token_value(raw: &str) -> TokenValueShape {
    if let Some(system) = raw.strip_suffix('|') {
        if !system.is_empty() && raw.matches('|').count() == 1 {
            return TokenValueShape::SystemPrefix(system.to_string());
        }
    }
    if let Some(code) = raw.strip_prefix('|') {
        // `|code`: code with no system
        return TokenValueShape::Overlap(code.to_string());
    }
    TokenValueShape::Overlap(raw.to_string())
}

/// Token search against the twin text array / sort columns.
pub(crate) fn build_token_clause(
    impl_: &SearchParameterImpl,
    alias: Option<&str>,
    modifier: Option<&SearchModifier>,
    values: &[SearchValue],
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    let text_column = column_ref(alias, &impl_.token_text_column());

    if matches!(modifier, Some(SearchModifier::Text)) {
        let sort_column = column_ref(alias, &impl_.token_sort_column());
        let mut parts = Vec::new();
        for v in values {
            if v.raw.is_empty() {
                continue;
            }
            let pattern = format!("{}%", escape_like_pattern(&v.raw.to_lowercase()));
            let idx = push_text(bind_params, pattern);
            parts.push(format!("LOWER({}) LIKE ${}", sort_column, idx));
        }
        return join_or(parts);
    }

    let mut overlap_indexes = Vec::new();
    let mut parts = Vec::new();
    for v in values {
        if v.raw.is_empty() {
            continue;
        }
        match parse_token_value(&v.raw) {
            TokenValueShape::Overlap(value) => {
                overlap_indexes.push(push_text(bind_params, value));
            }
            TokenValueShape::SystemPrefix(system) => {
                let pattern = format!("{}|%", escape_like_pattern(&system));
                let idx = push_text(bind_params, pattern);
                parts.push(format!(
                    "EXISTS (SELECT 1 FROM unnest({}) AS __token(value) WHERE __token.value LIKE ${})",
                    text_column, idx
                ));
            }
        }
    }
    if !overlap_indexes.is_empty() {
        let placeholders: Vec<String> =
            overlap_indexes.iter().map(|i| format!("${}", i)).collect();
        parts.insert(
            0,
            format!("{} && ARRAY[{}]::text[]", text_column, placeholders.join(",")),
        );
    }

    let clause = join_or(parts)?;
    if matches!(modifier, Some(SearchModifier::Not)) {
        Some(format!("NOT({})", clause))
    } else {
        Some(clause)
    }
}
