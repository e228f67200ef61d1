//! StructureDefinition serialization
//!
//! The inverse of the parser with three rules: `resourceType` first and all
//! other properties in alphabetical order, absent fields omitted while
//! `false`/`0`/`""` are preserved, and choice slots restored to their
//! concrete `field<Type>` property names (with `_field<Type>` companions
//! for primitive element metadata).

use serde_json::{Map, Value};
use siderite_models::*;
use std::collections::BTreeMap;

/// Alphabetically ordered property collector.
#[derive(Default)]
struct PropertyBag {
    entries: BTreeMap<String, Value>,
}

impl PropertyBag {
    fn put(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), value);
    }

    fn put_string(&mut self, name: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.put(name, Value::String(v.clone()));
        }
    }

    fn put_bool(&mut self, name: &str, value: &Option<bool>) {
        if let Some(v) = value {
            self.put(name, Value::Bool(*v));
        }
    }

    fn put_value(&mut self, name: &str, value: &Option<Value>) {
        if let Some(v) = value {
            self.put(name, v.clone());
        }
    }

    fn put_value_array(&mut self, name: &str, value: &Option<Vec<Value>>) {
        if let Some(items) = value {
            self.put(name, Value::Array(items.clone()));
        }
    }

    fn put_string_array(&mut self, name: &str, value: &Option<Vec<String>>) {
        if let Some(items) = value {
            self.put(
                name,
                Value::Array(items.iter().map(|s| Value::String(s.clone())).collect()),
            );
        }
    }

    fn put_choice(&mut self, choice: &Option<ChoiceValue>) {
        if let Some(cv) = choice {
            self.put(&cv.property_name, cv.value.clone());
            if let Some(ext) = &cv.element_extension {
                self.put(&format!("_{}", cv.property_name), ext.clone());
            }
        }
    }

    fn put_meta(&mut self, meta: &BTreeMap<String, Value>) {
        for (name, companion) in meta {
            self.put(&format!("_{}", name), companion.clone());
        }
    }

    /// Emit as a JSON object; `first` (resourceType) precedes the sorted rest.
    fn into_value(self, first: Option<(&str, Value)>) -> Value {
        let mut map = Map::new();
        if let Some((name, value)) = first {
            map.insert(name.to_string(), value);
        }
        for (name, value) in self.entries {
            map.insert(name, value);
        }
        Value::Object(map)
    }
}

/// Serialize a StructureDefinition to a JSON value with stable ordering.
pub fn serialize_structure_definition(sd: &StructureDefinition) -> Value {
    let mut bag = PropertyBag::default();

    bag.put_string("id", &sd.id);
    bag.put_value("meta", &sd.meta);
    bag.put_string("implicitRules", &sd.implicit_rules);
    bag.put_string("language", &sd.language);
    bag.put_value("text", &sd.text);
    bag.put_value_array("contained", &sd.contained);
    bag.put_value_array("extension", &sd.extension);
    bag.put_value_array("modifierExtension", &sd.modifier_extension);
    bag.put("url", Value::String(sd.url.clone()));
    bag.put_value_array("identifier", &sd.identifier);
    bag.put_string("version", &sd.version);
    bag.put("name", Value::String(sd.name.clone()));
    bag.put_string("title", &sd.title);
    bag.put("status", Value::String(sd.status.as_code().to_string()));
    bag.put_bool("experimental", &sd.experimental);
    bag.put_string("date", &sd.date);
    bag.put_string("publisher", &sd.publisher);
    bag.put_value_array("contact", &sd.contact);
    bag.put_string("description", &sd.description);
    bag.put_value_array("useContext", &sd.use_context);
    bag.put_value_array("jurisdiction", &sd.jurisdiction);
    bag.put_string("purpose", &sd.purpose);
    bag.put_string("copyright", &sd.copyright);
    bag.put_value_array("keyword", &sd.keyword);
    bag.put_string("fhirVersion", &sd.fhir_version);
    if let Some(mappings) = &sd.mapping {
        bag.put(
            "mapping",
            Value::Array(mappings.iter().map(serialize_sd_mapping).collect()),
        );
    }
    bag.put("kind", Value::String(sd.kind.as_code().to_string()));
    bag.put("abstract", Value::Bool(sd.is_abstract));
    if let Some(contexts) = &sd.context {
        bag.put(
            "context",
            Value::Array(contexts.iter().map(serialize_sd_context).collect()),
        );
    }
    bag.put_string_array("contextInvariant", &sd.context_invariant);
    bag.put("type", Value::String(sd.type_.clone()));
    bag.put_string("baseDefinition", &sd.base_definition);
    if let Some(derivation) = &sd.derivation {
        bag.put("derivation", Value::String(derivation.as_code().to_string()));
    }
    if let Some(snapshot) = &sd.snapshot {
        bag.put("snapshot", serialize_element_list(&snapshot.element));
    }
    if let Some(differential) = &sd.differential {
        bag.put("differential", serialize_element_list(&differential.element));
    }
    bag.put_meta(&sd.element_meta);

    bag.into_value(Some((
        "resourceType",
        Value::String("StructureDefinition".to_string()),
    )))
}

/// Serialize to a pretty-printed JSON string (two-space indent).
pub fn structure_definition_to_json_string(sd: &StructureDefinition) -> String {
    let value = serialize_structure_definition(sd);
    // serde_json's pretty printer uses two-space indentation
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

fn serialize_element_list(elements: &[ElementDefinition]) -> Value {
    let mut map = Map::new();
    map.insert(
        "element".to_string(),
        Value::Array(elements.iter().map(serialize_element_definition).collect()),
    );
    Value::Object(map)
}

/// Serialize a single ElementDefinition.
pub fn serialize_element_definition(elem: &ElementDefinition) -> Value {
    let mut bag = PropertyBag::default();

    bag.put_string("id", &elem.id);
    bag.put("path", Value::String(elem.path.clone()));
    bag.put_string_array("representation", &elem.representation);
    bag.put_string("sliceName", &elem.slice_name);
    bag.put_bool("sliceIsConstraining", &elem.slice_is_constraining);
    bag.put_string("label", &elem.label);
    bag.put_value_array("code", &elem.code);
    if let Some(slicing) = &elem.slicing {
        bag.put("slicing", serialize_slicing(slicing));
    }
    bag.put_string("short", &elem.short);
    bag.put_string("definition", &elem.definition);
    bag.put_string("comment", &elem.comment);
    bag.put_string("requirements", &elem.requirements);
    bag.put_string_array("alias", &elem.alias);
    if let Some(min) = elem.min {
        bag.put("min", Value::from(min));
    }
    bag.put_string("max", &elem.max);
    if let Some(base) = &elem.base {
        bag.put("base", serialize_base(base));
    }
    bag.put_string("contentReference", &elem.content_reference);
    if let Some(types) = &elem.types {
        bag.put("type", Value::Array(types.iter().map(serialize_type).collect()));
    }
    bag.put_choice(&elem.default_value);
    bag.put_string("meaningWhenMissing", &elem.meaning_when_missing);
    bag.put_string("orderMeaning", &elem.order_meaning);
    bag.put_choice(&elem.fixed);
    bag.put_choice(&elem.pattern);
    if let Some(examples) = &elem.example {
        bag.put(
            "example",
            Value::Array(examples.iter().map(serialize_example).collect()),
        );
    }
    bag.put_choice(&elem.min_value);
    bag.put_choice(&elem.max_value);
    if let Some(max_length) = elem.max_length {
        bag.put("maxLength", Value::from(max_length));
    }
    bag.put_string_array("condition", &elem.condition);
    if let Some(constraints) = &elem.constraint {
        bag.put(
            "constraint",
            Value::Array(constraints.iter().map(serialize_constraint).collect()),
        );
    }
    bag.put_bool("mustSupport", &elem.must_support);
    bag.put_bool("isModifier", &elem.is_modifier);
    bag.put_string("isModifierReason", &elem.is_modifier_reason);
    bag.put_bool("isSummary", &elem.is_summary);
    if let Some(binding) = &elem.binding {
        bag.put("binding", serialize_binding(binding));
    }
    if let Some(mappings) = &elem.mapping {
        bag.put(
            "mapping",
            Value::Array(mappings.iter().map(serialize_ed_mapping).collect()),
        );
    }
    bag.put_value_array("extension", &elem.extension);
    bag.put_value_array("modifierExtension", &elem.modifier_extension);
    bag.put_meta(&elem.element_meta);

    bag.into_value(None)
}

fn serialize_slicing(slicing: &ElementDefinitionSlicing) -> Value {
    let mut bag = PropertyBag::default();
    if let Some(discriminators) = &slicing.discriminator {
        bag.put(
            "discriminator",
            Value::Array(
                discriminators
                    .iter()
                    .map(|d| {
                        let mut inner = PropertyBag::default();
                        inner.put("type", Value::String(d.discriminator_type.as_code().to_string()));
                        inner.put("path", Value::String(d.path.clone()));
                        inner.into_value(None)
                    })
                    .collect(),
            ),
        );
    }
    bag.put_string("description", &slicing.description);
    bag.put_bool("ordered", &slicing.ordered);
    bag.put("rules", Value::String(slicing.rules.as_code().to_string()));
    bag.into_value(None)
}

fn serialize_base(base: &ElementDefinitionBase) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("path", Value::String(base.path.clone()));
    bag.put("min", Value::from(base.min));
    bag.put("max", Value::String(base.max.clone()));
    bag.into_value(None)
}

fn serialize_type(type_: &ElementDefinitionType) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("code", Value::String(type_.code.clone()));
    bag.put_string_array("profile", &type_.profile);
    bag.put_string_array("targetProfile", &type_.target_profile);
    bag.put_string_array("aggregation", &type_.aggregation);
    bag.put_string("versioning", &type_.versioning);
    bag.put_meta(&type_.element_meta);
    bag.into_value(None)
}

fn serialize_example(example: &ElementDefinitionExample) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("label", Value::String(example.label.clone()));
    bag.put_choice(&example.value);
    bag.into_value(None)
}

fn serialize_constraint(constraint: &ElementDefinitionConstraint) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("key", Value::String(constraint.key.clone()));
    bag.put_string("requirements", &constraint.requirements);
    bag.put("severity", Value::String(constraint.severity.as_code().to_string()));
    bag.put("human", Value::String(constraint.human.clone()));
    bag.put_string("expression", &constraint.expression);
    bag.put_string("xpath", &constraint.xpath);
    bag.put_string("source", &constraint.source);
    bag.into_value(None)
}

fn serialize_binding(binding: &ElementDefinitionBinding) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("strength", Value::String(binding.strength.as_code().to_string()));
    bag.put_string("description", &binding.description);
    bag.put_string("valueSet", &binding.value_set);
    bag.into_value(None)
}

fn serialize_ed_mapping(mapping: &ElementDefinitionMapping) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("identity", Value::String(mapping.identity.clone()));
    bag.put_string("language", &mapping.language);
    bag.put("map", Value::String(mapping.map.clone()));
    bag.put_string("comment", &mapping.comment);
    bag.into_value(None)
}

fn serialize_sd_mapping(mapping: &StructureDefinitionMapping) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("identity", Value::String(mapping.identity.clone()));
    bag.put_string("uri", &mapping.uri);
    bag.put_string("name", &mapping.name);
    bag.put_string("comment", &mapping.comment);
    bag.into_value(None)
}

fn serialize_sd_context(context: &StructureDefinitionContext) -> Value {
    let mut bag = PropertyBag::default();
    bag.put("type", Value::String(context.context_type.clone()));
    bag.put("expression", Value::String(context.expression.clone()));
    bag.into_value(None)
}
