//! Choice-type (`field[x]`) extraction
//!
//! A registry of choice slots per host type, and the extraction logic that
//! recognizes `field<Type>` properties, enforces the one-variant-per-slot
//! rule, and captures `_field<Type>` primitive metadata companions.

use crate::issue::{IssueCode, ParseIssue};
use serde_json::{Map, Value};
use siderite_models::{suffix_for_type, ChoiceValue};
use std::collections::{BTreeMap, BTreeSet};

/// A choice slot: its base name and the FHIR types it admits.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceField {
    pub base: &'static str,
    pub allowed: &'static [&'static str],
}

/// The R4 open type family, admitted by `defaultValue[x]`, `fixed[x]`,
/// `pattern[x]` and `Extension.value[x]`.
pub const OPEN_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "Address",
    "Age",
    "Annotation",
    "Attachment",
    "CodeableConcept",
    "Coding",
    "ContactPoint",
    "Count",
    "Distance",
    "Duration",
    "HumanName",
    "Identifier",
    "Money",
    "Period",
    "Quantity",
    "Range",
    "Ratio",
    "Reference",
    "SampledData",
    "Signature",
    "Timing",
    "ContactDetail",
    "Contributor",
    "DataRequirement",
    "Expression",
    "ParameterDefinition",
    "RelatedArtifact",
    "TriggerDefinition",
    "UsageContext",
    "Dosage",
    "Meta",
];

/// The nine ordered/comparable types admitted by `minValue[x]`/`maxValue[x]`.
pub const ORDERED_TYPES: &[&str] = &[
    "date",
    "dateTime",
    "instant",
    "time",
    "decimal",
    "integer",
    "positiveInt",
    "unsignedInt",
    "Quantity",
];

const ELEMENT_DEFINITION_CHOICE_FIELDS: &[ChoiceField] = &[
    ChoiceField { base: "defaultValue", allowed: OPEN_TYPES },
    ChoiceField { base: "fixed", allowed: OPEN_TYPES },
    ChoiceField { base: "pattern", allowed: OPEN_TYPES },
    ChoiceField { base: "minValue", allowed: ORDERED_TYPES },
    ChoiceField { base: "maxValue", allowed: ORDERED_TYPES },
];

const VALUE_CHOICE_FIELDS: &[ChoiceField] =
    &[ChoiceField { base: "value", allowed: OPEN_TYPES }];

/// The choice slots a host type owns
pub fn choice_fields_for(type_name: &str) -> &'static [ChoiceField] {
    match type_name {
        "ElementDefinition" => ELEMENT_DEFINITION_CHOICE_FIELDS,
        "Extension" | "ElementDefinitionExample" => VALUE_CHOICE_FIELDS,
        _ => &[],
    }
}

/// True when `key` names a variant of `base`: starts with the base name and
/// the first character of the suffix is uppercase.
fn is_variant_of(key: &str, base: &str) -> bool {
    key.len() > base.len()
        && key.starts_with(base)
        && key.as_bytes()[base.len()].is_ascii_uppercase()
}

/// Extract the value of one choice slot from `obj`.
///
/// Consumed keys (the property and its `_property` companion) are added to
/// `consumed`. An absent slot returns `None` without issue; more than one
/// variant raises `MULTIPLE_CHOICE_VALUES`; a variant-shaped key whose
/// suffix is outside the allowed set raises `INVALID_CHOICE_TYPE`.
pub fn extract_choice_value(
    obj: &Map<String, Value>,
    field: &ChoiceField,
    path: &str,
    consumed: &mut BTreeSet<String>,
    issues: &mut Vec<ParseIssue>,
) -> Option<ChoiceValue> {
    let mut matches: Vec<(&'static str, String)> = Vec::new();
    for type_name in field.allowed {
        let property = format!("{}{}", field.base, suffix_for_type(type_name));
        if obj.contains_key(&property) && !consumed.contains(&property) {
            matches.push((type_name, property));
        }
    }

    // Variant-shaped keys whose suffix is not in the allowed set
    for key in obj.keys() {
        if consumed.contains(key) || !is_variant_of(key, field.base) {
            continue;
        }
        if !matches.iter().any(|(_, p)| p == key) {
            issues.push(ParseIssue::error(
                IssueCode::InvalidChoiceType,
                format!(
                    "Type suffix \"{}\" is not allowed for {}[x]",
                    &key[field.base.len()..],
                    field.base
                ),
                format!("{}.{}", path, key),
            ));
            consumed.insert(key.clone());
            consumed.insert(format!("_{}", key));
        }
    }

    if matches.len() > 1 {
        issues.push(ParseIssue::error(
            IssueCode::MultipleChoiceValues,
            format!(
                "Multiple values for choice property {}[x]: {}",
                field.base,
                matches
                    .iter()
                    .map(|(_, p)| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            path,
        ));
        for (_, property) in &matches {
            consumed.insert(property.clone());
            consumed.insert(format!("_{}", property));
        }
        return None;
    }

    let (type_name, property) = matches.pop()?;
    consumed.insert(property.clone());

    let mut choice = ChoiceValue::new(property.clone(), type_name, obj[&property].clone());

    let companion_key = format!("_{}", property);
    if let Some(companion) = obj.get(&companion_key) {
        choice.element_extension = Some(companion.clone());
        consumed.insert(companion_key);
    }

    Some(choice)
}

/// Extract every choice slot the host type owns, keyed by base name.
pub fn extract_all_choice_values(
    obj: &Map<String, Value>,
    fields: &[ChoiceField],
    path: &str,
    consumed: &mut BTreeSet<String>,
    issues: &mut Vec<ParseIssue>,
) -> BTreeMap<String, ChoiceValue> {
    let mut out = BTreeMap::new();
    for field in fields {
        if let Some(choice) = extract_choice_value(obj, field, path, consumed, issues) {
            out.insert(field.base.to_string(), choice);
        }
    }
    out
}
