//! Generic complex-type parsing
//!
//! Walks a JSON object against a per-type property schema in four passes:
//! known properties, primitive `_field` metadata pairing, choice-type
//! detection, and unknown-property warnings. FHIR JSON forbids `null`
//! except as an alignment placeholder inside arrays.

use crate::choice::{extract_all_choice_values, ChoiceField};
use crate::issue::{IssueCode, ParseIssue};
use crate::primitives::{merge_primitive_array, merge_primitive_element, validate_primitive};
use serde_json::{Map, Value};
use siderite_models::ChoiceValue;
use std::collections::{BTreeMap, BTreeSet};

/// What a schema property holds
#[derive(Debug, Clone, Copy)]
pub enum PropertyKind {
    /// A FHIR primitive of the given type name
    Primitive(&'static str),
    /// A nested complex value, handed back raw for a dedicated sub-parser
    Complex,
}

/// One entry of a per-type property schema
#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub array: bool,
}

impl PropertySpec {
    pub const fn primitive(name: &'static str, fhir_type: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Primitive(fhir_type),
            array: false,
        }
    }

    pub const fn primitive_array(name: &'static str, fhir_type: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Primitive(fhir_type),
            array: true,
        }
    }

    pub const fn complex(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Complex,
            array: false,
        }
    }

    pub const fn complex_array(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Complex,
            array: true,
        }
    }
}

/// Output of the generic walker: consumed property values, their `_field`
/// companions, and extracted choice values.
#[derive(Debug, Default)]
pub struct ParsedObject {
    pub values: BTreeMap<String, Value>,
    pub meta: BTreeMap<String, Value>,
    pub choices: BTreeMap<String, ChoiceValue>,
}

impl ParsedObject {
    pub fn take_value(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn take_string(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn take_bool(&mut self, name: &str) -> Option<bool> {
        self.values.remove(name).and_then(|v| v.as_bool())
    }

    pub fn take_u32(&mut self, name: &str) -> Option<u32> {
        self.values
            .remove(name)
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn take_i64(&mut self, name: &str) -> Option<i64> {
        self.values.remove(name).and_then(|v| v.as_i64())
    }

    pub fn take_value_array(&mut self, name: &str) -> Option<Vec<Value>> {
        match self.values.remove(name) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    pub fn take_string_array(&mut self, name: &str) -> Option<Vec<String>> {
        self.take_value_array(name).map(|items| {
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn take_choice(&mut self, base: &str) -> Option<ChoiceValue> {
        self.choices.remove(base)
    }
}

/// Walk `obj` against `schema`, accumulating issues. `pre_consumed` keys
/// (e.g. `resourceType`) are skipped by every pass.
pub fn parse_object(
    obj: &Map<String, Value>,
    schema: &[PropertySpec],
    choice_fields: &[ChoiceField],
    path: &str,
    pre_consumed: &[&str],
    issues: &mut Vec<ParseIssue>,
) -> ParsedObject {
    let mut out = ParsedObject::default();
    let mut consumed: BTreeSet<String> =
        pre_consumed.iter().map(|k| k.to_string()).collect();

    // Pass 1: known properties
    for spec in schema {
        let Some(raw) = obj.get(spec.name) else {
            continue;
        };
        consumed.insert(spec.name.to_string());
        let prop_path = format!("{}.{}", path, spec.name);

        if raw.is_null() {
            issues.push(ParseIssue::error(
                IssueCode::UnexpectedNull,
                "Null is only allowed as an array alignment placeholder",
                prop_path,
            ));
            continue;
        }

        if spec.array {
            let items: Vec<Value> = match raw {
                Value::Array(items) => {
                    if items.is_empty() {
                        issues.push(ParseIssue::warning(
                            IssueCode::InvalidStructure,
                            "Array property must not be empty",
                            &prop_path,
                        ));
                        continue;
                    }
                    items.clone()
                }
                other => {
                    // Recover by treating the value as a single-element array
                    issues.push(ParseIssue::warning(
                        IssueCode::InvalidStructure,
                        "Expected an array; wrapping single value",
                        &prop_path,
                    ));
                    vec![other.clone()]
                }
            };

            if let PropertyKind::Primitive(fhir_type) = spec.kind {
                for (i, item) in items.iter().enumerate() {
                    // Null entries are alignment placeholders for `_field`
                    if !item.is_null() {
                        validate_primitive(
                            item,
                            fhir_type,
                            &format!("{}[{}]", prop_path, i),
                            issues,
                        );
                    }
                }
            }
            out.values.insert(spec.name.to_string(), Value::Array(items));
        } else {
            match spec.kind {
                PropertyKind::Primitive(fhir_type) => {
                    if validate_primitive(raw, fhir_type, &prop_path, issues) {
                        out.values.insert(spec.name.to_string(), raw.clone());
                    }
                }
                PropertyKind::Complex => {
                    if raw.is_object() {
                        out.values.insert(spec.name.to_string(), raw.clone());
                    } else {
                        issues.push(ParseIssue::error(
                            IssueCode::InvalidStructure,
                            "Expected an object",
                            &prop_path,
                        ));
                    }
                }
            }
        }
    }

    // Pass 2: primitive metadata pairing
    for (key, companion) in obj {
        let Some(base) = key.strip_prefix('_') else {
            continue;
        };
        let Some(spec) = schema
            .iter()
            .find(|s| s.name == base && matches!(s.kind, PropertyKind::Primitive(_)))
        else {
            continue;
        };
        let PropertyKind::Primitive(fhir_type) = spec.kind else {
            continue;
        };
        let prop_path = format!("{}.{}", path, base);

        if spec.array {
            let values: Vec<Value> = match out.values.get(base) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            if merge_primitive_array(&values, Some(companion), fhir_type, &prop_path, issues)
                .is_some()
            {
                out.meta.insert(base.to_string(), companion.clone());
            }
        } else if merge_primitive_element(
            out.values.get(base),
            Some(companion),
            fhir_type,
            &prop_path,
            issues,
        )
        .is_some()
        {
            out.meta.insert(base.to_string(), companion.clone());
        }
        consumed.insert(key.clone());
    }

    // Pass 3: choice-type detection
    out.choices = extract_all_choice_values(obj, choice_fields, path, &mut consumed, issues);

    // Pass 4: unknown properties
    for key in obj.keys() {
        if consumed.contains(key) {
            continue;
        }
        if let Some(base) = key.strip_prefix('_') {
            if consumed.contains(base) {
                continue;
            }
        }
        issues.push(ParseIssue::warning(
            IssueCode::UnexpectedProperty,
            format!("Unexpected property \"{}\"", key),
            format!("{}.{}", path, key),
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::has_errors;
    use serde_json::json;

    const SCHEMA: &[PropertySpec] = &[
        PropertySpec::primitive("name", "string"),
        PropertySpec::primitive("active", "boolean"),
        PropertySpec::primitive_array("alias", "string"),
        PropertySpec::complex("detail"),
        PropertySpec::complex_array("entries"),
    ];

    fn walk(value: Value) -> (ParsedObject, Vec<ParseIssue>) {
        let Value::Object(obj) = value else {
            panic!("expected object")
        };
        let mut issues = Vec::new();
        let parsed = parse_object(&obj, SCHEMA, &[], "$", &[], &mut issues);
        (parsed, issues)
    }

    #[test]
    fn known_properties_are_consumed() {
        let (mut parsed, issues) = walk(json!({
            "name": "x",
            "active": true,
            "detail": {"a": 1},
            "entries": [{"b": 2}]
        }));
        assert!(issues.is_empty());
        assert_eq!(parsed.take_string("name"), Some("x".to_string()));
        assert_eq!(parsed.take_bool("active"), Some(true));
        assert!(parsed.take_value("detail").is_some());
        assert_eq!(parsed.take_value_array("entries").unwrap().len(), 1);
    }

    #[test]
    fn null_on_non_array_is_an_error() {
        let (_, issues) = walk(json!({"name": null}));
        assert!(has_errors(&issues));
        assert_eq!(issues[0].code, IssueCode::UnexpectedNull);
    }

    #[test]
    fn non_array_recovers_by_wrapping() {
        let (mut parsed, issues) = walk(json!({"alias": "only"}));
        assert!(!has_errors(&issues));
        assert_eq!(issues[0].code, IssueCode::InvalidStructure);
        assert_eq!(parsed.take_string_array("alias"), Some(vec!["only".to_string()]));
    }

    #[test]
    fn empty_array_warns() {
        let (mut parsed, issues) = walk(json!({"alias": []}));
        assert!(!has_errors(&issues));
        assert_eq!(issues.len(), 1);
        assert!(parsed.take_value("alias").is_none());
    }

    #[test]
    fn null_array_entries_are_preserved() {
        let (mut parsed, issues) = walk(json!({"alias": ["a", null, "b"]}));
        assert!(issues.is_empty());
        let items = parsed.take_value_array("alias").unwrap();
        assert_eq!(items, vec![json!("a"), json!(null), json!("b")]);
    }

    #[test]
    fn metadata_companion_is_paired_and_consumed() {
        let (parsed, issues) = walk(json!({
            "name": "x",
            "_name": {"id": "n1"}
        }));
        assert!(issues.is_empty());
        assert_eq!(parsed.meta["name"], json!({"id": "n1"}));
    }

    #[test]
    fn misaligned_companion_array_is_an_error() {
        let (_, issues) = walk(json!({
            "alias": ["a", "b"],
            "_alias": [{"id": "x"}]
        }));
        assert!(has_errors(&issues));
        assert!(issues.iter().any(|i| i.code == IssueCode::ArrayMismatch));
    }

    #[test]
    fn unknown_properties_warn_without_failing() {
        let (_, issues) = walk(json!({"name": "x", "bogus": 1}));
        assert!(!has_errors(&issues));
        assert_eq!(issues[0].code, IssueCode::UnexpectedProperty);
        assert_eq!(issues[0].path, "$.bogus");
    }

    #[test]
    fn orphan_underscore_key_warns_only_when_base_unconsumed() {
        let (_, issues) = walk(json!({"_bogus": {"id": "x"}}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::UnexpectedProperty);

        // `_name` with a consumed base never warns
        let (_, issues) = walk(json!({"name": "x", "_name": {"id": "n1"}}));
        assert!(issues.is_empty());
    }
}
