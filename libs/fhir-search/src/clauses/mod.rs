//! Per-type WHERE clause builders

pub(crate) mod date;
pub(crate) mod lookup;
pub(crate) mod number;
pub(crate) mod reference;
pub(crate) mod string;
pub(crate) mod token;
pub(crate) mod uri;

/// Column reference, qualified with a table alias when compiling inside a
/// subquery (chained search targets).
pub(crate) fn column_ref(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.\"{}\"", alias, column),
        None => format!("\"{}\"", column),
    }
}

/// OR-join clause parts, parenthesizing only when needed.
pub(crate) fn join_or(mut parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => Some(parts.remove(0)),
        _ => Some(format!("({})", parts.join(" OR "))),
    }
}

/// Escape SQL LIKE meta-characters so user input is treated literally.
pub(crate) fn escape_like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
