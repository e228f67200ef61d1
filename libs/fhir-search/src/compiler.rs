//! WHERE-clause compilation
//!
//! Compiles parsed search parameters into a SQL WHERE fragment against the
//! projected schema. Values of one parameter combine with OR, parameters
//! combine with AND, and `$n` indices are allocated left-to-right across
//! the whole query. Chained parameters compile to an EXISTS over the
//! source's references table joined to the target resource table.

use crate::bind::{push_text, BindValue};
use crate::clauses::{
    column_ref, date::build_date_clause, join_or, lookup::build_lookup_clause,
    number::build_number_clause, reference::build_reference_clause, string::build_string_clause,
    token::build_token_clause, uri::build_uri_clause,
};
use crate::error::{Error, Result};
use crate::params::{ParsedParam, SearchPrefix};
use crate::registry::{IndexStrategy, SearchParamType, SearchParameterImpl, SearchParameterRegistry};

/// A compiled WHERE fragment and its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledWhere {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// Compile all parameters for a resource type; parameters AND together.
pub fn compile_where(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    params: &[ParsedParam],
) -> Result<CompiledWhere> {
    let mut bind_params = Vec::new();
    let mut conjuncts = Vec::new();
    for param in params {
        if let Some(clause) =
            compile_param(registry, resource_type, param, None, &mut bind_params)?
        {
            conjuncts.push(clause);
        }
    }
    Ok(CompiledWhere {
        sql: conjuncts.join(" AND "),
        params: bind_params,
    })
}

fn compile_param(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    param: &ParsedParam,
    alias: Option<&str>,
    bind_params: &mut Vec<BindValue>,
) -> Result<Option<String>> {
    if let Some(chain) = &param.chain {
        return compile_chain(registry, resource_type, param, chain, alias, bind_params)
            .map(Some);
    }

    if let Some(clause) = compile_metadata_param(registry, param, alias, bind_params)? {
        return Ok(Some(clause));
    }

    let impl_ = registry
        .lookup(resource_type, &param.code)
        .ok_or_else(|| Error::UnknownParameter {
            resource_type: resource_type.to_string(),
            code: param.code.clone(),
        })?;

    Ok(compile_impl(impl_, param, alias, bind_params))
}

fn compile_impl(
    impl_: &SearchParameterImpl,
    param: &ParsedParam,
    alias: Option<&str>,
    bind_params: &mut Vec<BindValue>,
) -> Option<String> {
    match impl_.strategy {
        IndexStrategy::LookupTable => build_lookup_clause(
            impl_,
            alias,
            param.modifier.as_ref(),
            &param.values,
            bind_params,
        ),
        IndexStrategy::TokenColumn => build_token_clause(
            impl_,
            alias,
            param.modifier.as_ref(),
            &param.values,
            bind_params,
        ),
        IndexStrategy::Column => {
            let column = column_ref(alias, &impl_.column_name);
            match impl_.param_type {
                SearchParamType::Date => build_date_clause(&column, &param.values, bind_params),
                SearchParamType::Number | SearchParamType::Quantity => {
                    build_number_clause(&column, &param.values, bind_params)
                }
                SearchParamType::Reference => {
                    build_reference_clause(&column, &param.values, bind_params)
                }
                SearchParamType::Uri => build_uri_clause(&column, &param.values, bind_params),
                _ => build_string_clause(
                    &column,
                    param.modifier.as_ref(),
                    &param.values,
                    bind_params,
                ),
            }
        }
    }
}

/// Metadata parameters compile against fixed columns without registry
/// entries: `_id`, `_lastUpdated`, `_tag`, `_security`, `_profile`,
/// `_source`.
fn compile_metadata_param(
    registry: &SearchParameterRegistry,
    param: &ParsedParam,
    alias: Option<&str>,
    bind_params: &mut Vec<BindValue>,
) -> Result<Option<String>> {
    let clause = match param.code.as_str() {
        "_id" => {
            let column = column_ref(alias, "id");
            let mut parts = Vec::new();
            for v in &param.values {
                let idx = push_text(bind_params, v.raw.clone());
                parts.push(format!("{} = ${}", column, idx));
            }
            join_or(parts)
        }
        "_lastUpdated" => {
            let column = column_ref(alias, "lastUpdated");
            let mut parts = Vec::new();
            for v in &param.values {
                let prefix = v.prefix.unwrap_or(SearchPrefix::Eq);
                let Some(op) = prefix.sql_operator() else {
                    continue;
                };
                let idx = push_text(bind_params, v.raw.clone());
                parts.push(format!("{} {} ${}", column, op, idx));
            }
            join_or(parts)
        }
        "_tag" | "_security" => match registry.lookup("", &param.code) {
            Some(impl_) => build_token_clause(
                impl_,
                alias,
                param.modifier.as_ref(),
                &param.values,
                bind_params,
            ),
            None => None,
        },
        "_profile" => {
            let column = column_ref(alias, "_profile");
            let mut indexes = Vec::new();
            for v in &param.values {
                indexes.push(push_text(bind_params, v.raw.clone()));
            }
            if indexes.is_empty() {
                None
            } else {
                let placeholders: Vec<String> =
                    indexes.iter().map(|i| format!("${}", i)).collect();
                Some(format!(
                    "{} && ARRAY[{}]::text[]",
                    column,
                    placeholders.join(",")
                ))
            }
        }
        "_source" => {
            let column = column_ref(alias, "_source");
            let mut parts = Vec::new();
            for v in &param.values {
                let idx = push_text(bind_params, v.raw.clone());
                parts.push(format!("{} = ${}", column, idx));
            }
            join_or(parts)
        }
        _ => return Ok(None),
    };
    Ok(clause)
}

/// Chained search: `subject:Patient.name=Smith` compiles to an EXISTS over
/// the references table joined to the target table, with the chained
/// parameter compiled recursively against the target alias.
fn compile_chain(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    param: &ParsedParam,
    chain: &crate::params::ChainedParam,
    alias: Option<&str>,
    bind_params: &mut Vec<BindValue>,
) -> Result<String> {
    let source_id = match alias {
        Some(alias) => format!("{}.\"id\"", alias),
        None => format!("\"{}\".\"id\"", resource_type),
    };

    let target_predicate = compile_param(
        registry,
        &chain.target_type,
        &chain.param,
        Some("__target"),
        bind_params,
    )?
    .ok_or_else(|| Error::InvalidChain(format!("{}.{}", param.code, chain.param.code)))?;

    Ok(format!(
        "EXISTS (SELECT 1 FROM \"{source}_References\" __ref JOIN \"{target}\" __target ON __ref.\"targetId\" = __target.\"id\" WHERE __ref.\"resourceId\" = {source_id} AND __ref.\"code\" = '{code}' AND __target.\"deleted\" = false AND {predicate})",
        source = resource_type,
        target = chain.target_type,
        source_id = source_id,
        code = param.code,
        predicate = target_predicate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_parameter;
    use serde_json::json;

    fn registry() -> SearchParameterRegistry {
        SearchParameterRegistry::from_bundle(&json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "SearchParameter", "code": "birthdate",
                    "type": "date", "expression": "Patient.birthDate", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "gender",
                    "type": "token", "expression": "Patient.gender", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "name",
                    "type": "string", "expression": "Patient.name", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "subject",
                    "type": "reference", "expression": "Observation.subject", "base": ["Observation"]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parameters_combine_with_and() {
        let registry = registry();
        let params = vec![
            parse_parameter("_id", "abc"),
            parse_parameter("gender", "male"),
            parse_parameter("birthdate", "ge1990-01-01"),
        ];
        let compiled = compile_where(&registry, "Patient", &params).unwrap();
        assert_eq!(
            compiled.sql,
            "\"id\" = $1 AND \"__genderText\" && ARRAY[$2]::text[] AND \"birthdate\" >= $3"
        );
        assert_eq!(
            compiled.params,
            vec![
                BindValue::Text("abc".to_string()),
                BindValue::Text("male".to_string()),
                BindValue::Text("1990-01-01".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let registry = registry();
        let params = vec![parse_parameter("frobnicate", "x")];
        let err = compile_where(&registry, "Patient", &params).unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { .. }));
    }

    #[test]
    fn chained_search_compiles_exists_join() {
        let registry = registry();
        let params = vec![parse_parameter("subject:Patient.name", "Smith")];
        let compiled = compile_where(&registry, "Observation", &params).unwrap();
        assert_eq!(
            compiled.sql,
            "EXISTS (SELECT 1 FROM \"Observation_References\" __ref JOIN \"Patient\" __target ON __ref.\"targetId\" = __target.\"id\" WHERE __ref.\"resourceId\" = \"Observation\".\"id\" AND __ref.\"code\" = 'subject' AND __target.\"deleted\" = false AND EXISTS (SELECT 1 FROM \"HumanName\" __lookup WHERE __lookup.\"resourceId\" = __target.\"id\" AND LOWER(__lookup.\"name\") LIKE $1))"
        );
        assert_eq!(compiled.params, vec![BindValue::Text("smith%".to_string())]);
    }

    #[test]
    fn metadata_params_compile_against_fixed_columns() {
        let registry = SearchParameterRegistry::new();
        let params = vec![
            parse_parameter("_lastUpdated", "ge2024-01-01T00:00:00Z"),
            parse_parameter("_tag", "http://example.org/tags|vip"),
            parse_parameter("_profile", "http://example.org/StructureDefinition/P"),
            parse_parameter("_source", "http://upstream.example.org"),
        ];
        let compiled = compile_where(&registry, "Patient", &params).unwrap();
        assert!(compiled.sql.contains("\"lastUpdated\" >= $1"));
        assert!(compiled.sql.contains("\"___tagText\" && ARRAY[$2]::text[]"));
        assert!(compiled.sql.contains("\"_profile\" && ARRAY[$3]::text[]"));
        assert!(compiled.sql.contains("\"_source\" = $4"));
    }

    #[test]
    fn or_values_allocate_consecutive_indices() {
        let registry = registry();
        let params = vec![
            parse_parameter("name", "smith,jones"),
            parse_parameter("_id", "abc"),
        ];
        let compiled = compile_where(&registry, "Patient", &params).unwrap();
        // Indices allocated left-to-right across the whole query
        assert!(compiled.sql.contains("$1"));
        assert!(compiled.sql.contains("$2"));
        assert!(compiled.sql.contains("\"id\" = $3"));
        assert_eq!(compiled.params.len(), 3);
    }
}
