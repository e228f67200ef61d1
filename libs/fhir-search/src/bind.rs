//! Bind-parameter allocation for compiled SQL

/// A positional bind value for the compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    TextArray(Vec<String>),
}

/// Push a text value; returns its 1-based `$n` index.
pub(crate) fn push_text(bind_params: &mut Vec<BindValue>, value: String) -> usize {
    bind_params.push(BindValue::Text(value));
    bind_params.len()
}
