//! Search value extraction
//!
//! Walks the registry expressions over a resource's JSON (dotted property
//! navigation with array flattening) and produces the column values,
//! lookup-table rows, and reference rows a write must persist.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use siderite_search::{
    expression_path, ColumnType, IndexStrategy, LookupTable, SearchParamType,
    SearchParameterRegistry,
};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A materialized search column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    TextArray(Vec<String>),
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Timestamp(DateTime<Utc>),
    Number(f64),
}

/// A row for one of the shared lookup tables.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRow {
    pub table: LookupTable,
    pub columns: BTreeMap<String, String>,
}

/// A row for the `<Type>_References` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub code: String,
    pub target_type: String,
    pub target_id: Uuid,
}

/// Everything a write must index for one resource.
#[derive(Debug, Default, Clone)]
pub struct ExtractedValues {
    pub columns: HashMap<String, ColumnValue>,
    pub lookup_rows: Vec<LookupRow>,
    pub references: Vec<ReferenceRow>,
}

/// Navigate dotted segments over JSON, flattening arrays.
fn select_values<'a>(content: &'a Value, segments: &[String]) -> Vec<&'a Value> {
    let mut current = vec![content];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(obj) => {
                    if let Some(v) = obj.get(segment.as_str()) {
                        match v {
                            Value::Array(items) => next.extend(items.iter()),
                            other => next.push(other),
                        }
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(segment.as_str()) {
                            match v {
                                Value::Array(inner) => next.extend(inner.iter()),
                                other => next.push(other),
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current.into_iter().filter(|v| !v.is_null()).collect()
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field)?.as_str().map(|s| s.to_string())
}

/// Token forms extracted from Coding, CodeableConcept, Identifier,
/// ContactPoint, or bare primitives.
struct TokenValue {
    system: Option<String>,
    code: String,
    display: Option<String>,
}

fn extract_tokens(value: &Value, out: &mut Vec<TokenValue>) {
    match value {
        Value::Object(obj) => {
            if let Some(codings) = obj.get("coding") {
                extract_tokens(codings, out);
                return;
            }
            let system = string_field(value, "system");
            if let Some(code) = string_field(value, "code") {
                out.push(TokenValue {
                    system,
                    code,
                    display: string_field(value, "display"),
                });
            } else if let Some(v) = string_field(value, "value") {
                out.push(TokenValue {
                    system,
                    code: v,
                    display: None,
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_tokens(item, out);
            }
        }
        Value::String(s) => out.push(TokenValue {
            system: None,
            code: s.clone(),
            display: None,
        }),
        Value::Bool(b) => out.push(TokenValue {
            system: None,
            code: b.to_string(),
            display: None,
        }),
        _ => {}
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Utc
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single();
    }
    None
}

fn first_string(values: &[&Value]) -> Option<String> {
    values.iter().find_map(|v| v.as_str().map(|s| s.to_string()))
}

fn human_name_row(value: &Value) -> LookupRow {
    let mut columns = BTreeMap::new();
    let family = string_field(value, "family");
    let given: Vec<String> = value
        .get("given")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let mut full: Vec<String> = given.clone();
    if let Some(f) = &family {
        full.push(f.clone());
    }
    let formatted = string_field(value, "text").unwrap_or_else(|| full.join(" "));
    columns.insert("name".to_string(), formatted);
    if !given.is_empty() {
        columns.insert("given".to_string(), given.join(" "));
    }
    if let Some(f) = family {
        columns.insert("family".to_string(), f);
    }
    LookupRow {
        table: LookupTable::HumanName,
        columns,
    }
}

fn address_row(value: &Value) -> LookupRow {
    let mut columns = BTreeMap::new();
    let mut parts: Vec<String> = value
        .get("line")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    for field in ["city", "state", "postalCode", "country"] {
        if let Some(v) = string_field(value, field) {
            columns.insert(field.to_string(), v.clone());
            parts.push(v);
        }
    }
    if let Some(use_) = string_field(value, "use") {
        columns.insert("use".to_string(), use_);
    }
    let formatted = string_field(value, "text").unwrap_or_else(|| parts.join(" "));
    columns.insert("address".to_string(), formatted);
    LookupRow {
        table: LookupTable::Address,
        columns,
    }
}

fn system_value_row(table: LookupTable, value: &Value) -> LookupRow {
    let mut columns = BTreeMap::new();
    if let Some(system) = string_field(value, "system") {
        columns.insert("system".to_string(), system);
    }
    if let Some(v) = string_field(value, "value") {
        columns.insert("value".to_string(), v);
    }
    LookupRow { table, columns }
}

fn lookup_rows_for(table: LookupTable, content: &Value) -> Vec<LookupRow> {
    let property = match table {
        LookupTable::HumanName => "name",
        LookupTable::Address => "address",
        LookupTable::ContactPoint => "telecom",
        LookupTable::Identifier => "identifier",
    };
    let Some(items) = content.get(property).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match table {
            LookupTable::HumanName => human_name_row(item),
            LookupTable::Address => address_row(item),
            LookupTable::ContactPoint | LookupTable::Identifier => system_value_row(table, item),
        })
        .collect()
}

fn reference_rows(code: &str, values: &[&Value]) -> Vec<ReferenceRow> {
    let mut out = Vec::new();
    for value in values {
        let Some(reference) = value
            .get("reference")
            .and_then(Value::as_str)
            .or_else(|| value.as_str())
        else {
            continue;
        };
        let Some((target_type, raw_id)) = reference.split_once('/') else {
            continue;
        };
        if let Ok(target_id) = Uuid::parse_str(raw_id) {
            out.push(ReferenceRow {
                code: code.to_string(),
                target_type: target_type.to_string(),
                target_id,
            });
        }
    }
    out
}

/// Deterministic UUID for a token, so exact-match search can use the UUID
/// array column.
fn token_uuid(system: Option<&str>, code: &str) -> Uuid {
    let key = match system {
        Some(system) => format!("{}|{}", system, code),
        None => code.to_string(),
    };
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// Extract all registry-driven index data for one resource.
pub fn extract_search_values(
    registry: &SearchParameterRegistry,
    resource_type: &str,
    content: &Value,
) -> ExtractedValues {
    let mut out = ExtractedValues::default();
    let mut lookup_tables_done: Vec<LookupTable> = Vec::new();

    for impl_ in registry.iterate(resource_type) {
        let Some(segments) = expression_path(resource_type, &impl_.expression) else {
            continue;
        };
        match impl_.strategy {
            IndexStrategy::LookupTable => {
                let Some(table) = impl_.lookup_table else {
                    continue;
                };
                // One row set per table, not per parameter
                if !lookup_tables_done.contains(&table) {
                    lookup_tables_done.push(table);
                    out.lookup_rows.extend(lookup_rows_for(table, content));
                }
            }
            IndexStrategy::TokenColumn => {
                let values = select_values(content, &segments);
                let mut tokens = Vec::new();
                for value in &values {
                    extract_tokens(value, &mut tokens);
                }
                if tokens.is_empty() {
                    continue;
                }
                let mut uuids = Vec::new();
                let mut texts = Vec::new();
                for token in &tokens {
                    uuids.push(token_uuid(token.system.as_deref(), &token.code));
                    texts.push(token.code.clone());
                    if let Some(system) = &token.system {
                        texts.push(format!("{}|{}", system, token.code));
                    }
                }
                let sort = tokens[0]
                    .display
                    .clone()
                    .unwrap_or_else(|| tokens[0].code.clone());
                out.columns
                    .insert(impl_.token_column(), ColumnValue::UuidArray(uuids));
                out.columns
                    .insert(impl_.token_text_column(), ColumnValue::TextArray(texts));
                out.columns
                    .insert(impl_.token_sort_column(), ColumnValue::Text(sort));
            }
            IndexStrategy::Column => {
                let values = select_values(content, &segments);
                if values.is_empty() {
                    continue;
                }
                if impl_.param_type == SearchParamType::Reference {
                    out.references.extend(reference_rows(&impl_.code, &values));
                }
                let column_value = match impl_.column_type {
                    ColumnType::TimestampTz => values
                        .iter()
                        .find_map(|v| v.as_str())
                        .and_then(parse_timestamp)
                        .map(ColumnValue::Timestamp),
                    ColumnType::DoublePrecision => {
                        values.iter().find_map(|v| v.as_f64()).map(ColumnValue::Number)
                    }
                    ColumnType::TextArray => Some(ColumnValue::TextArray(
                        values
                            .iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect(),
                    )),
                    _ => match impl_.param_type {
                        SearchParamType::Reference => values
                            .iter()
                            .find_map(|v| {
                                v.get("reference").and_then(Value::as_str).or_else(|| v.as_str())
                            })
                            .map(|s| ColumnValue::Text(s.to_string())),
                        _ => first_string(&values).map(ColumnValue::Text),
                    },
                };
                if let Some(cv) = column_value {
                    out.columns.insert(impl_.column_name.clone(), cv);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
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
                {"resource": {"resourceType": "SearchParameter", "code": "family",
                    "type": "string", "expression": "Patient.name.family", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "subject",
                    "type": "reference", "expression": "Observation.subject", "base": ["Observation"]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn token_extraction_fills_twin_arrays_and_sort() {
        let content = json!({"resourceType": "Patient", "gender": "male"});
        let extracted = extract_search_values(&registry(), "Patient", &content);
        assert_eq!(
            extracted.columns["__genderText"],
            ColumnValue::TextArray(vec!["male".to_string()])
        );
        assert_eq!(
            extracted.columns["__genderSort"],
            ColumnValue::Text("male".to_string())
        );
        assert!(matches!(
            extracted.columns["__gender"],
            ColumnValue::UuidArray(ref v) if v.len() == 1
        ));
    }

    #[test]
    fn token_uuid_is_deterministic() {
        assert_eq!(token_uuid(Some("s"), "c"), token_uuid(Some("s"), "c"));
        assert_ne!(token_uuid(Some("s"), "c"), token_uuid(None, "c"));
    }

    #[test]
    fn date_column_parses_date_only_values() {
        let content = json!({"resourceType": "Patient", "birthDate": "1990-06-01"});
        let extracted = extract_search_values(&registry(), "Patient", &content);
        match &extracted.columns["birthdate"] {
            ColumnValue::Timestamp(ts) => {
                assert_eq!(ts.format("%Y-%m-%d").to_string(), "1990-06-01")
            }
            other => panic!("expected timestamp, got {:?}", other),
        }
    }

    #[test]
    fn human_name_rows_are_emitted_once_per_element() {
        let content = json!({
            "resourceType": "Patient",
            "name": [
                {"given": ["Alice", "B"], "family": "Smith"},
                {"text": "Bob Jones"}
            ]
        });
        let extracted = extract_search_values(&registry(), "Patient", &content);
        // Both `name` and `family` params target HumanName; rows emitted once
        assert_eq!(extracted.lookup_rows.len(), 2);
        assert_eq!(extracted.lookup_rows[0].table, LookupTable::HumanName);
        assert_eq!(extracted.lookup_rows[0].columns["name"], "Alice B Smith");
        assert_eq!(extracted.lookup_rows[0].columns["family"], "Smith");
        assert_eq!(extracted.lookup_rows[1].columns["name"], "Bob Jones");
    }

    #[test]
    fn references_produce_rows_and_text_column() {
        let patient_id = Uuid::new_v4();
        let content = json!({
            "resourceType": "Observation",
            "subject": {"reference": format!("Patient/{}", patient_id)}
        });
        let extracted = extract_search_values(&registry(), "Observation", &content);
        assert_eq!(extracted.references.len(), 1);
        assert_eq!(extracted.references[0].code, "subject");
        assert_eq!(extracted.references[0].target_type, "Patient");
        assert_eq!(extracted.references[0].target_id, patient_id);
        assert_eq!(
            extracted.columns["subject"],
            ColumnValue::Text(format!("Patient/{}", patient_id))
        );
    }

    #[test]
    fn codeable_concept_tokens_include_system_form() {
        let registry = SearchParameterRegistry::from_bundle(&json!({
            "resourceType": "Bundle",
            "entry": [{"resource": {"resourceType": "SearchParameter", "code": "code",
                "type": "token", "expression": "Observation.code", "base": ["Observation"]}}]
        }))
        .unwrap();
        let content = json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": "1234-5", "display": "Example"}]}
        });
        let extracted = extract_search_values(&registry, "Observation", &content);
        match &extracted.columns["__codeText"] {
            ColumnValue::TextArray(texts) => {
                assert!(texts.contains(&"1234-5".to_string()));
                assert!(texts.contains(&"http://loinc.org|1234-5".to_string()));
            }
            other => panic!("expected text array, got {:?}", other),
        }
        assert_eq!(
            extracted.columns["__codeSort"],
            ColumnValue::Text("Example".to_string())
        );
    }
}
