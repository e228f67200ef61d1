//! StructureDefinition and ElementDefinition parsing
//!
//! Concrete property schemas for StructureDefinition and its 37-field
//! ElementDefinition, built on the generic walker in [`crate::complex`].

use crate::choice::choice_fields_for;
use crate::complex::{parse_object, ParsedObject, PropertySpec};
use crate::issue::{IssueCode, ParseIssue, ParseResult};
use serde_json::{Map, Value};
use siderite_models::*;

const SD_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("id", "id"),
    PropertySpec::complex("meta"),
    PropertySpec::primitive("implicitRules", "uri"),
    PropertySpec::primitive("language", "code"),
    PropertySpec::complex("text"),
    PropertySpec::complex_array("contained"),
    PropertySpec::complex_array("extension"),
    PropertySpec::complex_array("modifierExtension"),
    PropertySpec::primitive("url", "uri"),
    PropertySpec::complex_array("identifier"),
    PropertySpec::primitive("version", "string"),
    PropertySpec::primitive("name", "string"),
    PropertySpec::primitive("title", "string"),
    PropertySpec::primitive("status", "code"),
    PropertySpec::primitive("experimental", "boolean"),
    PropertySpec::primitive("date", "dateTime"),
    PropertySpec::primitive("publisher", "string"),
    PropertySpec::complex_array("contact"),
    PropertySpec::primitive("description", "markdown"),
    PropertySpec::complex_array("useContext"),
    PropertySpec::complex_array("jurisdiction"),
    PropertySpec::primitive("purpose", "markdown"),
    PropertySpec::primitive("copyright", "markdown"),
    PropertySpec::complex_array("keyword"),
    PropertySpec::primitive("fhirVersion", "code"),
    PropertySpec::complex_array("mapping"),
    PropertySpec::primitive("kind", "code"),
    PropertySpec::primitive("abstract", "boolean"),
    PropertySpec::complex_array("context"),
    PropertySpec::primitive_array("contextInvariant", "string"),
    PropertySpec::primitive("type", "uri"),
    PropertySpec::primitive("baseDefinition", "canonical"),
    PropertySpec::primitive("derivation", "code"),
    PropertySpec::complex("snapshot"),
    PropertySpec::complex("differential"),
];

const ED_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("id", "string"),
    PropertySpec::complex_array("extension"),
    PropertySpec::complex_array("modifierExtension"),
    PropertySpec::primitive("path", "string"),
    PropertySpec::primitive_array("representation", "code"),
    PropertySpec::primitive("sliceName", "string"),
    PropertySpec::primitive("sliceIsConstraining", "boolean"),
    PropertySpec::primitive("label", "string"),
    PropertySpec::complex_array("code"),
    PropertySpec::complex("slicing"),
    PropertySpec::primitive("short", "string"),
    PropertySpec::primitive("definition", "markdown"),
    PropertySpec::primitive("comment", "markdown"),
    PropertySpec::primitive("requirements", "markdown"),
    PropertySpec::primitive_array("alias", "string"),
    PropertySpec::primitive("min", "unsignedInt"),
    PropertySpec::primitive("max", "string"),
    PropertySpec::complex("base"),
    PropertySpec::primitive("contentReference", "uri"),
    PropertySpec::complex_array("type"),
    PropertySpec::primitive("meaningWhenMissing", "markdown"),
    PropertySpec::primitive("orderMeaning", "string"),
    PropertySpec::complex_array("example"),
    PropertySpec::primitive("maxLength", "integer"),
    PropertySpec::primitive_array("condition", "id"),
    PropertySpec::complex_array("constraint"),
    PropertySpec::primitive("mustSupport", "boolean"),
    PropertySpec::primitive("isModifier", "boolean"),
    PropertySpec::primitive("isModifierReason", "string"),
    PropertySpec::primitive("isSummary", "boolean"),
    PropertySpec::complex("binding"),
    PropertySpec::complex_array("mapping"),
];

const ELEMENT_LIST_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("id", "string"),
    PropertySpec::complex_array("extension"),
    PropertySpec::complex_array("element"),
];

const SLICING_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("id", "string"),
    PropertySpec::complex_array("extension"),
    PropertySpec::complex_array("discriminator"),
    PropertySpec::primitive("description", "string"),
    PropertySpec::primitive("ordered", "boolean"),
    PropertySpec::primitive("rules", "code"),
];

const DISCRIMINATOR_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("type", "code"),
    PropertySpec::primitive("path", "string"),
];

const BASE_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("path", "string"),
    PropertySpec::primitive("min", "unsignedInt"),
    PropertySpec::primitive("max", "string"),
];

const TYPE_SCHEMA: &[PropertySpec] = &[
    PropertySpec::complex_array("extension"),
    PropertySpec::primitive("code", "uri"),
    PropertySpec::primitive_array("profile", "canonical"),
    PropertySpec::primitive_array("targetProfile", "canonical"),
    PropertySpec::primitive_array("aggregation", "code"),
    PropertySpec::primitive("versioning", "code"),
];

const CONSTRAINT_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("key", "id"),
    PropertySpec::primitive("requirements", "string"),
    PropertySpec::primitive("severity", "code"),
    PropertySpec::primitive("human", "string"),
    PropertySpec::primitive("expression", "string"),
    PropertySpec::primitive("xpath", "string"),
    PropertySpec::primitive("source", "canonical"),
];

const BINDING_SCHEMA: &[PropertySpec] = &[
    PropertySpec::complex_array("extension"),
    PropertySpec::primitive("strength", "code"),
    PropertySpec::primitive("description", "string"),
    PropertySpec::primitive("valueSet", "canonical"),
];

const ED_MAPPING_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("identity", "id"),
    PropertySpec::primitive("language", "code"),
    PropertySpec::primitive("map", "string"),
    PropertySpec::primitive("comment", "string"),
];

const SD_MAPPING_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("identity", "id"),
    PropertySpec::primitive("uri", "uri"),
    PropertySpec::primitive("name", "string"),
    PropertySpec::primitive("comment", "string"),
];

const CONTEXT_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("type", "code"),
    PropertySpec::primitive("expression", "string"),
];

const EXAMPLE_SCHEMA: &[PropertySpec] = &[
    PropertySpec::primitive("label", "string"),
];

/// Parse a StructureDefinition from a JSON string.
pub fn parse_structure_definition_str(input: &str) -> ParseResult<StructureDefinition> {
    match serde_json::from_str::<Value>(input) {
        Ok(value) => parse_structure_definition(&value),
        Err(err) => ParseResult::failure(vec![ParseIssue::error(
            IssueCode::InvalidJson,
            format!("Invalid JSON: {}", err),
            "$",
        )]),
    }
}

/// Parse a StructureDefinition from a JSON value.
pub fn parse_structure_definition(json: &Value) -> ParseResult<StructureDefinition> {
    let Value::Object(obj) = json else {
        return ParseResult::failure(vec![ParseIssue::error(
            IssueCode::InvalidJson,
            "Resource must be a JSON object",
            "$",
        )]);
    };

    match obj.get("resourceType") {
        None => {
            return ParseResult::failure(vec![ParseIssue::error(
                IssueCode::MissingResourceType,
                "Missing resourceType property",
                "$",
            )]);
        }
        Some(Value::String(rt)) if rt == "StructureDefinition" => {}
        Some(other) => {
            return ParseResult::failure(vec![ParseIssue::error(
                IssueCode::UnknownResourceType,
                format!("Unknown resource type {}", other),
                "$.resourceType",
            )]);
        }
    }

    let path = "StructureDefinition";
    let mut issues = Vec::new();
    let mut parsed = parse_object(obj, SD_SCHEMA, &[], path, &["resourceType"], &mut issues);

    let mut sd = StructureDefinition {
        id: parsed.take_string("id"),
        meta: parsed.take_value("meta"),
        implicit_rules: parsed.take_string("implicitRules"),
        language: parsed.take_string("language"),
        text: parsed.take_value("text"),
        contained: parsed.take_value_array("contained"),
        extension: parsed.take_value_array("extension"),
        modifier_extension: parsed.take_value_array("modifierExtension"),
        url: require_string(&mut parsed, "url", path, &mut issues),
        identifier: parsed.take_value_array("identifier"),
        version: parsed.take_string("version"),
        name: require_string(&mut parsed, "name", path, &mut issues),
        title: parsed.take_string("title"),
        status: PublicationStatus::default(),
        experimental: parsed.take_bool("experimental"),
        date: parsed.take_string("date"),
        publisher: parsed.take_string("publisher"),
        contact: parsed.take_value_array("contact"),
        description: parsed.take_string("description"),
        use_context: parsed.take_value_array("useContext"),
        jurisdiction: parsed.take_value_array("jurisdiction"),
        purpose: parsed.take_string("purpose"),
        copyright: parsed.take_string("copyright"),
        keyword: parsed.take_value_array("keyword"),
        fhir_version: parsed.take_string("fhirVersion"),
        mapping: None,
        kind: StructureDefinitionKind::default(),
        is_abstract: false,
        context: None,
        context_invariant: parsed.take_string_array("contextInvariant"),
        type_: require_string(&mut parsed, "type", path, &mut issues),
        base_definition: parsed.take_string("baseDefinition"),
        derivation: None,
        snapshot: None,
        differential: None,
        element_meta: Default::default(),
    };

    match parsed.take_string("status") {
        Some(code) => match PublicationStatus::from_code(&code) {
            Some(status) => sd.status = status,
            None => issues.push(ParseIssue::error(
                IssueCode::InvalidPrimitive,
                format!("Invalid status code \"{}\"", code),
                format!("{}.status", path),
            )),
        },
        None => issues.push(missing_required("status", path)),
    }

    match parsed.take_string("kind") {
        Some(code) => match StructureDefinitionKind::from_code(&code) {
            Some(kind) => sd.kind = kind,
            None => issues.push(ParseIssue::error(
                IssueCode::InvalidPrimitive,
                format!("Invalid kind code \"{}\"", code),
                format!("{}.kind", path),
            )),
        },
        None => issues.push(missing_required("kind", path)),
    }

    match parsed.take_bool("abstract") {
        Some(value) => sd.is_abstract = value,
        None => issues.push(missing_required("abstract", path)),
    }

    if let Some(code) = parsed.take_string("derivation") {
        match TypeDerivationRule::from_code(&code) {
            Some(rule) => sd.derivation = Some(rule),
            None => issues.push(ParseIssue::error(
                IssueCode::InvalidPrimitive,
                format!("Invalid derivation code \"{}\"", code),
                format!("{}.derivation", path),
            )),
        }
    }

    if let Some(items) = parsed.take_value_array("mapping") {
        sd.mapping = Some(parse_each(
            &items,
            &format!("{}.mapping", path),
            &mut issues,
            parse_sd_mapping,
        ));
    }

    if let Some(items) = parsed.take_value_array("context") {
        sd.context = Some(parse_each(
            &items,
            &format!("{}.context", path),
            &mut issues,
            parse_sd_context,
        ));
    }

    if let Some(value) = parsed.take_value("snapshot") {
        sd.snapshot = Some(Snapshot {
            element: parse_element_list(&value, &format!("{}.snapshot", path), &mut issues),
        });
    }

    if let Some(value) = parsed.take_value("differential") {
        sd.differential = Some(Differential {
            element: parse_element_list(&value, &format!("{}.differential", path), &mut issues),
        });
    }

    sd.element_meta = parsed.meta;

    tracing::debug!(url = %sd.url, issues = issues.len(), "parsed StructureDefinition");
    ParseResult::new(sd, issues)
}

fn missing_required(name: &str, path: &str) -> ParseIssue {
    ParseIssue::error(
        IssueCode::InvalidPrimitive,
        format!("Missing required property \"{}\"", name),
        format!("{}.{}", path, name),
    )
}

fn require_string(
    parsed: &mut ParsedObject,
    name: &str,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> String {
    match parsed.take_string(name) {
        Some(s) => s,
        None => {
            issues.push(missing_required(name, path));
            String::new()
        }
    }
}

/// Parse each item of a complex array, skipping non-objects with an error.
fn parse_each<T>(
    items: &[Value],
    path: &str,
    issues: &mut Vec<ParseIssue>,
    parse: impl Fn(&Map<String, Value>, &str, &mut Vec<ParseIssue>) -> T,
) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        match item {
            Value::Object(obj) => out.push(parse(obj, &item_path, issues)),
            _ => issues.push(ParseIssue::error(
                IssueCode::InvalidStructure,
                "Expected an object",
                item_path,
            )),
        }
    }
    out
}

fn parse_element_list(value: &Value, path: &str, issues: &mut Vec<ParseIssue>) -> Vec<ElementDefinition> {
    let Value::Object(obj) = value else {
        issues.push(ParseIssue::error(
            IssueCode::InvalidStructure,
            "Expected an object",
            path,
        ));
        return Vec::new();
    };
    let mut parsed = parse_object(obj, ELEMENT_LIST_SCHEMA, &[], path, &[], issues);
    match parsed.take_value_array("element") {
        Some(items) => parse_each(
            &items,
            &format!("{}.element", path),
            issues,
            parse_element_definition,
        ),
        None => Vec::new(),
    }
}

/// Parse a single ElementDefinition object.
pub fn parse_element_definition(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinition {
    let mut parsed = parse_object(
        obj,
        ED_SCHEMA,
        choice_fields_for("ElementDefinition"),
        path,
        &[],
        issues,
    );

    let mut elem = ElementDefinition {
        id: parsed.take_string("id"),
        path: require_string(&mut parsed, "path", path, issues),
        representation: parsed.take_string_array("representation"),
        slice_name: parsed.take_string("sliceName"),
        slice_is_constraining: parsed.take_bool("sliceIsConstraining"),
        label: parsed.take_string("label"),
        code: parsed.take_value_array("code"),
        slicing: None,
        short: parsed.take_string("short"),
        definition: parsed.take_string("definition"),
        comment: parsed.take_string("comment"),
        requirements: parsed.take_string("requirements"),
        alias: parsed.take_string_array("alias"),
        min: parsed.take_u32("min"),
        max: parsed.take_string("max"),
        base: None,
        content_reference: parsed.take_string("contentReference"),
        types: None,
        default_value: parsed.take_choice("defaultValue"),
        meaning_when_missing: parsed.take_string("meaningWhenMissing"),
        order_meaning: parsed.take_string("orderMeaning"),
        fixed: parsed.take_choice("fixed"),
        pattern: parsed.take_choice("pattern"),
        example: None,
        min_value: parsed.take_choice("minValue"),
        max_value: parsed.take_choice("maxValue"),
        max_length: parsed.take_i64("maxLength"),
        condition: parsed.take_string_array("condition"),
        constraint: None,
        must_support: parsed.take_bool("mustSupport"),
        is_modifier: parsed.take_bool("isModifier"),
        is_modifier_reason: parsed.take_string("isModifierReason"),
        is_summary: parsed.take_bool("isSummary"),
        binding: None,
        mapping: None,
        extension: parsed.take_value_array("extension"),
        modifier_extension: parsed.take_value_array("modifierExtension"),
        element_meta: Default::default(),
    };

    if let Some(value) = parsed.take_value("slicing") {
        if let Value::Object(slicing_obj) = &value {
            elem.slicing = Some(parse_slicing(slicing_obj, &format!("{}.slicing", path), issues));
        }
    }

    if let Some(value) = parsed.take_value("base") {
        if let Value::Object(base_obj) = &value {
            elem.base = parse_base(base_obj, &format!("{}.base", path), issues);
        }
    }

    if let Some(items) = parsed.take_value_array("type") {
        elem.types = Some(parse_each(&items, &format!("{}.type", path), issues, parse_type));
    }

    if let Some(items) = parsed.take_value_array("example") {
        elem.example = Some(parse_each(
            &items,
            &format!("{}.example", path),
            issues,
            parse_example,
        ));
    }

    if let Some(items) = parsed.take_value_array("constraint") {
        elem.constraint = Some(parse_each(
            &items,
            &format!("{}.constraint", path),
            issues,
            parse_constraint,
        ));
    }

    if let Some(value) = parsed.take_value("binding") {
        if let Value::Object(binding_obj) = &value {
            elem.binding = parse_binding(binding_obj, &format!("{}.binding", path), issues);
        }
    }

    if let Some(items) = parsed.take_value_array("mapping") {
        elem.mapping = Some(parse_each(
            &items,
            &format!("{}.mapping", path),
            issues,
            parse_ed_mapping,
        ));
    }

    elem.element_meta = parsed.meta;
    elem
}

fn parse_slicing(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionSlicing {
    let mut parsed = parse_object(obj, SLICING_SCHEMA, &[], path, &[], issues);
    let mut slicing = ElementDefinitionSlicing {
        discriminator: None,
        description: parsed.take_string("description"),
        ordered: parsed.take_bool("ordered"),
        rules: SlicingRules::default(),
    };

    match parsed.take_string("rules") {
        Some(code) => match SlicingRules::from_code(&code) {
            Some(rules) => slicing.rules = rules,
            None => issues.push(ParseIssue::error(
                IssueCode::InvalidPrimitive,
                format!("Invalid slicing rules code \"{}\"", code),
                format!("{}.rules", path),
            )),
        },
        None => issues.push(missing_required("rules", path)),
    }

    if let Some(items) = parsed.take_value_array("discriminator") {
        slicing.discriminator = Some(parse_each(
            &items,
            &format!("{}.discriminator", path),
            issues,
            parse_discriminator,
        ));
    }

    slicing
}

fn parse_discriminator(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionDiscriminator {
    let mut parsed = parse_object(obj, DISCRIMINATOR_SCHEMA, &[], path, &[], issues);
    let discriminator_type = match parsed.take_string("type") {
        Some(code) => match DiscriminatorType::from_code(&code) {
            Some(t) => t,
            None => {
                issues.push(ParseIssue::error(
                    IssueCode::InvalidPrimitive,
                    format!("Invalid discriminator type \"{}\"", code),
                    format!("{}.type", path),
                ));
                DiscriminatorType::Value
            }
        },
        None => {
            issues.push(missing_required("type", path));
            DiscriminatorType::Value
        }
    };
    ElementDefinitionDiscriminator {
        discriminator_type,
        path: require_string(&mut parsed, "path", path, issues),
    }
}

fn parse_base(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> Option<ElementDefinitionBase> {
    let mut parsed = parse_object(obj, BASE_SCHEMA, &[], path, &[], issues);
    Some(ElementDefinitionBase {
        path: require_string(&mut parsed, "path", path, issues),
        min: parsed.take_u32("min").unwrap_or(0),
        max: parsed.take_string("max").unwrap_or_else(|| "*".to_string()),
    })
}

fn parse_type(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionType {
    let mut parsed = parse_object(obj, TYPE_SCHEMA, &[], path, &[], issues);
    let code = require_string(&mut parsed, "code", path, issues);
    ElementDefinitionType {
        code,
        profile: parsed.take_string_array("profile"),
        target_profile: parsed.take_string_array("targetProfile"),
        aggregation: parsed.take_string_array("aggregation"),
        versioning: parsed.take_string("versioning"),
        element_meta: parsed.meta,
    }
}

fn parse_example(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionExample {
    let mut parsed = parse_object(
        obj,
        EXAMPLE_SCHEMA,
        choice_fields_for("ElementDefinitionExample"),
        path,
        &[],
        issues,
    );
    ElementDefinitionExample {
        label: require_string(&mut parsed, "label", path, issues),
        value: parsed.take_choice("value"),
    }
}

fn parse_constraint(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionConstraint {
    let mut parsed = parse_object(obj, CONSTRAINT_SCHEMA, &[], path, &[], issues);
    let severity = match parsed.take_string("severity") {
        Some(code) => match ConstraintSeverity::from_code(&code) {
            Some(s) => s,
            None => {
                issues.push(ParseIssue::error(
                    IssueCode::InvalidPrimitive,
                    format!("Invalid constraint severity \"{}\"", code),
                    format!("{}.severity", path),
                ));
                ConstraintSeverity::Error
            }
        },
        None => {
            issues.push(missing_required("severity", path));
            ConstraintSeverity::Error
        }
    };
    ElementDefinitionConstraint {
        key: require_string(&mut parsed, "key", path, issues),
        requirements: parsed.take_string("requirements"),
        severity,
        human: require_string(&mut parsed, "human", path, issues),
        expression: parsed.take_string("expression"),
        xpath: parsed.take_string("xpath"),
        source: parsed.take_string("source"),
    }
}

fn parse_binding(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> Option<ElementDefinitionBinding> {
    let mut parsed = parse_object(obj, BINDING_SCHEMA, &[], path, &[], issues);
    let strength = match parsed.take_string("strength") {
        Some(code) => match BindingStrength::from_code(&code) {
            Some(s) => s,
            None => {
                issues.push(ParseIssue::error(
                    IssueCode::InvalidPrimitive,
                    format!("Invalid binding strength \"{}\"", code),
                    format!("{}.strength", path),
                ));
                return None;
            }
        },
        None => {
            issues.push(missing_required("strength", path));
            return None;
        }
    };
    Some(ElementDefinitionBinding {
        strength,
        description: parsed.take_string("description"),
        value_set: parsed.take_string("valueSet"),
    })
}

fn parse_ed_mapping(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> ElementDefinitionMapping {
    let mut parsed = parse_object(obj, ED_MAPPING_SCHEMA, &[], path, &[], issues);
    ElementDefinitionMapping {
        identity: require_string(&mut parsed, "identity", path, issues),
        language: parsed.take_string("language"),
        map: require_string(&mut parsed, "map", path, issues),
        comment: parsed.take_string("comment"),
    }
}

fn parse_sd_mapping(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> StructureDefinitionMapping {
    let mut parsed = parse_object(obj, SD_MAPPING_SCHEMA, &[], path, &[], issues);
    StructureDefinitionMapping {
        identity: require_string(&mut parsed, "identity", path, issues),
        uri: parsed.take_string("uri"),
        name: parsed.take_string("name"),
        comment: parsed.take_string("comment"),
    }
}

fn parse_sd_context(
    obj: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<ParseIssue>,
) -> StructureDefinitionContext {
    let mut parsed = parse_object(obj, CONTEXT_SCHEMA, &[], path, &[], issues);
    StructureDefinitionContext {
        context_type: require_string(&mut parsed, "type", path, issues),
        expression: require_string(&mut parsed, "expression", path, issues),
    }
}
