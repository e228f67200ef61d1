//! FHIR primitive parsing
//!
//! Validates primitive JSON values against their declared FHIR type and
//! merges `_field` companion objects (element id/extension metadata) with
//! their values, including index-aligned primitive arrays.

use crate::issue::{IssueCode, ParseIssue};
use serde_json::{Map, Value};

/// Host representation expected for a FHIR primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostKind {
    Bool,
    /// Whole-number types (integer, positiveInt, unsignedInt)
    Integer,
    /// Arbitrary-precision numbers (decimal)
    Number,
    /// Everything string-based; unknown types default here
    String,
}

fn host_kind(fhir_type: &str) -> HostKind {
    match fhir_type {
        "boolean" => HostKind::Bool,
        "integer" | "positiveInt" | "unsignedInt" => HostKind::Integer,
        "decimal" => HostKind::Number,
        _ => HostKind::String,
    }
}

/// Validate a primitive value against its FHIR type, pushing an
/// `INVALID_PRIMITIVE` error on mismatch. Returns whether the value is valid.
pub fn validate_primitive(
    value: &Value,
    fhir_type: &str,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> bool {
    let ok = match host_kind(fhir_type) {
        HostKind::Bool => value.is_boolean(),
        HostKind::Integer => match value.as_i64() {
            Some(n) => match fhir_type {
                "positiveInt" => n >= 1,
                "unsignedInt" => n >= 0,
                _ => true,
            },
            None => false,
        },
        HostKind::Number => value.is_number(),
        HostKind::String => value.is_string(),
    };

    if !ok {
        issues.push(ParseIssue::error(
            IssueCode::InvalidPrimitive,
            format!("Invalid value for {} property", fhir_type),
            path,
        ));
    }
    ok
}

fn element_metadata(element: &Value, path: &str, issues: &mut Vec<ParseIssue>) -> Option<Map<String, Value>> {
    match element {
        Value::Object(obj) => {
            let mut out = Map::new();
            if let Some(id) = obj.get("id") {
                out.insert("id".to_string(), id.clone());
            }
            if let Some(extension) = obj.get("extension") {
                out.insert("extension".to_string(), extension.clone());
            }
            Some(out)
        }
        Value::Null => None,
        _ => {
            issues.push(ParseIssue::error(
                IssueCode::InvalidStructure,
                "Primitive element metadata must be an object",
                path,
            ));
            None
        }
    }
}

/// Merge a primitive value with its `_field` companion.
///
/// Returns one of three shapes: the raw value when no metadata is present,
/// `{value?, id?, extension?}` when the companion adds metadata (the value
/// key may be absent when only extension data exists), or `None` when
/// neither side is present.
pub fn merge_primitive_element(
    value: Option<&Value>,
    element: Option<&Value>,
    fhir_type: &str,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> Option<Value> {
    let value = match value {
        Some(Value::Null) | None => None,
        Some(v) => {
            if !validate_primitive(v, fhir_type, path, issues) {
                return None;
            }
            Some(v)
        }
    };

    let metadata = element.and_then(|e| element_metadata(e, &format!("_{}", path), issues));

    match (value, metadata) {
        (Some(v), None) => Some(v.clone()),
        (value, Some(mut meta)) => {
            if let Some(v) = value {
                meta.insert("value".to_string(), v.clone());
            }
            Some(Value::Object(meta))
        }
        (None, None) => None,
    }
}

/// Merge a primitive array with its `_field` companion array.
///
/// The companion must be absent or an array of the same length; `null`
/// entries on either side are legal alignment placeholders. A length
/// mismatch raises `ARRAY_MISMATCH`.
pub fn merge_primitive_array(
    values: &[Value],
    element: Option<&Value>,
    fhir_type: &str,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> Option<Value> {
    let elements: Option<&Vec<Value>> = match element {
        None | Some(Value::Null) => None,
        Some(Value::Array(arr)) => {
            if arr.len() != values.len() {
                issues.push(ParseIssue::error(
                    IssueCode::ArrayMismatch,
                    format!(
                        "Primitive array length {} does not match element array length {}",
                        values.len(),
                        arr.len()
                    ),
                    path,
                ));
                return None;
            }
            Some(arr)
        }
        Some(_) => {
            issues.push(ParseIssue::error(
                IssueCode::ArrayMismatch,
                "Primitive element companion must be an array",
                format!("_{}", path),
            ));
            return None;
        }
    };

    let mut merged = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        let value_opt = match value {
            Value::Null => None,
            v => Some(v),
        };
        let element_opt = elements.and_then(|arr| match &arr[i] {
            Value::Null => None,
            e => Some(e),
        });
        match merge_primitive_element(value_opt, element_opt, fhir_type, &item_path, issues) {
            Some(v) => merged.push(v),
            None => merged.push(Value::Null),
        }
    }
    Some(Value::Array(merged))
}
