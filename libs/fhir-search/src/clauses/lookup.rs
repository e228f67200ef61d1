use crate::bind::{push_text, BindValue};
use crate::params::{SearchModifier, SearchValue};
use crate::registry::{SearchParamType, SearchParameterImpl};

use super::{column_ref, join_or, string::build_string_clause};

/// Inner predicate for a token value against the lookup row's
/// `system`/`value` columns.
fn token_row_predicate(
    value_column: &str,
    raw: &str,
    bind_params: &mut Vec<BindValue>,
) -> String {
    match raw.split_once('|') {
        Some((system, "")) => {
            let idx = push_text(bind_params, system.to_string());
            format!("__lookup.\"system\" = ${}", idx)
        }
        Some(("", code)) => {
            let idx = push_text(bind_params, code.to_string());
            format!(
                "(__lookup.\"system\" IS NULL AND __lookup.\"{}\" = ${})",
                value_column, idx
            )
        }
        Some((system, code)) => {
            let sys_idx = push_text(bind_params, system.to_string());
            let code_idx = push_text(bind_params, code.to_string());
            format!(
                "(__lookup.\"system\" = ${} AND __lookup.\"{}\" = ${})",
                sys_idx, value_column, code_idx
            )
        }
        None => {
            let idx = push_text(bind_params, raw.to_string());
            format!("__lookup.\"{}\" = ${}", value_column, idx)
        }
    }
}

/// Lookup-table search: an EXISTS subquery over the shared table keyed by
/// `resourceId`, applying the string or token rules to the row column.
pub(crate) fn build_lookup_clause(
    impl_: &SearchParameterImpl,
    alias: Option<&str>,
    modifier: Option<&SearchModifier>,
    values: &[SearchValue],
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    let table = impl_.lookup_table?.table_name();
    let id_column = column_ref(alias, "id");

    let inner = match impl_.param_type {
        SearchParamType::Token => {
            let mut parts = Vec::new();
            for v in values {
                if v.raw.is_empty() {
                    continue;
                }
                parts.push(token_row_predicate(&impl_.column_name, &v.raw, bind_params));
            }
            join_or(parts)?
        }
        _ => {
            let inner_column = format!("__lookup.\"{}\"", impl_.column_name);
            build_string_clause(&inner_column, modifier, values, bind_params)?
        }
    };

    Some(format!(
        "EXISTS (SELECT 1 FROM \"{}\" __lookup WHERE __lookup.\"resourceId\" = {} AND {})",
        table, id_column, inner
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ColumnType, IndexStrategy, LookupTable};

    fn name_impl() -> SearchParameterImpl {
        SearchParameterImpl {
            resource_types: vec!["Patient".to_string()],
            code: "name".to_string(),
            param_type: SearchParamType::String,
            expression: "Patient.name".to_string(),
            strategy: IndexStrategy::LookupTable,
            column_name: "name".to_string(),
            column_type: ColumnType::Text,
            array: false,
            lookup_table: Some(LookupTable::HumanName),
        }
    }

    fn identifier_impl() -> SearchParameterImpl {
        SearchParameterImpl {
            resource_types: vec!["Patient".to_string()],
            code: "identifier".to_string(),
            param_type: SearchParamType::Token,
            expression: "Patient.identifier".to_string(),
            strategy: IndexStrategy::LookupTable,
            column_name: "value".to_string(),
            column_type: ColumnType::Text,
            array: false,
            lookup_table: Some(LookupTable::Identifier),
        }
    }

    fn values(raws: &[&str]) -> Vec<SearchValue> {
        raws.iter()
            .map(|r| SearchValue {
                raw: r.to_string(),
                prefix: None,
            })
            .collect()
    }

    #[test]
    fn string_lookup_exists_subquery() {
        let mut bind = Vec::new();
        let clause =
            build_lookup_clause(&name_impl(), None, None, &values(&["Smith"]), &mut bind).unwrap();
        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM \"HumanName\" __lookup WHERE __lookup.\"resourceId\" = \"id\" AND LOWER(__lookup.\"name\") LIKE $1)"
        );
        assert_eq!(bind, vec![BindValue::Text("smith%".to_string())]);
    }

    #[test]
    fn token_lookup_splits_system_and_value() {
        let mut bind = Vec::new();
        let clause = build_lookup_clause(
            &identifier_impl(),
            None,
            None,
            &values(&["http://hospital.org/mrn|12345"]),
            &mut bind,
        )
        .unwrap();
        assert!(clause.contains("__lookup.\"system\" = $1"));
        assert!(clause.contains("__lookup.\"value\" = $2"));
        assert_eq!(
            bind,
            vec![
                BindValue::Text("http://hospital.org/mrn".to_string()),
                BindValue::Text("12345".to_string()),
            ]
        );
    }

    #[test]
    fn aliased_outer_id_is_qualified() {
        let mut bind = Vec::new();
        let clause = build_lookup_clause(
            &name_impl(),
            Some("__target"),
            None,
            &values(&["smith"]),
            &mut bind,
        )
        .unwrap();
        assert!(clause.contains("__lookup.\"resourceId\" = __target.\"id\""));
    }
}
