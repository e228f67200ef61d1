//! FHIR ElementDefinition model
//!
//! ElementDefinition describes one field path of a StructureDefinition's
//! snapshot or differential. The five choice-typed slots (`defaultValue[x]`,
//! `fixed[x]`, `pattern[x]`, `minValue[x]`, `maxValue[x]`) are stored as
//! [`ChoiceValue`]s; at most one variant per slot per element.

use super::choice::ChoiceValue;
use super::complex::*;
use serde_json::Value;
use std::collections::BTreeMap;

/// FHIR ElementDefinition - defines an element in a resource or data type structure
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDefinition {
    /// Unique id for inter-element referencing
    pub id: Option<String>,

    /// Path of the element in the hierarchy (e.g., "Patient.name")
    pub path: String,

    /// Codes that define how this element is represented (xmlAttr, xhtml, ...)
    pub representation: Option<Vec<String>>,

    /// Name for this particular element (in a slice)
    pub slice_name: Option<String>,

    /// If this slice definition constrains an inherited slice
    pub slice_is_constraining: Option<bool>,

    /// Name for element to display with or prompt for element
    pub label: Option<String>,

    /// Corresponding codes in terminologies (Coding)
    pub code: Option<Vec<Value>>,

    /// This element is sliced - slices follow
    pub slicing: Option<ElementDefinitionSlicing>,

    /// Short label
    pub short: Option<String>,

    /// Full formal definition
    pub definition: Option<String>,

    /// Comments about the use of this element
    pub comment: Option<String>,

    /// Why this resource has been created
    pub requirements: Option<String>,

    /// Other names
    pub alias: Option<Vec<String>>,

    /// Minimum cardinality
    pub min: Option<u32>,

    /// Maximum cardinality (a number or "*")
    pub max: Option<String>,

    /// Base definition information
    pub base: Option<ElementDefinitionBase>,

    /// Reference to definition of content if present (`#Type.path`)
    pub content_reference: Option<String>,

    /// Data type and profile for this element
    pub types: Option<Vec<ElementDefinitionType>>,

    /// `defaultValue[x]` - specified value if missing from instance
    pub default_value: Option<ChoiceValue>,

    /// Implicit meaning when this element is missing
    pub meaning_when_missing: Option<String>,

    /// What the order of the elements means
    pub order_meaning: Option<String>,

    /// `fixed[x]` - value must be exactly this
    pub fixed: Option<ChoiceValue>,

    /// `pattern[x]` - value must have at least these property values
    pub pattern: Option<ChoiceValue>,

    /// Example values (as defined for type)
    pub example: Option<Vec<ElementDefinitionExample>>,

    /// `minValue[x]` - minimum allowed value (ordered types only)
    pub min_value: Option<ChoiceValue>,

    /// `maxValue[x]` - maximum allowed value (ordered types only)
    pub max_value: Option<ChoiceValue>,

    /// Max length for strings
    pub max_length: Option<i64>,

    /// Reference to invariants about presence
    pub condition: Option<Vec<String>>,

    /// Conditions that must evaluate to true
    pub constraint: Option<Vec<ElementDefinitionConstraint>>,

    /// If the element must be supported by implementations
    pub must_support: Option<bool>,

    /// If this modifies the meaning of other elements
    pub is_modifier: Option<bool>,

    /// Reason that this element is marked as a modifier
    pub is_modifier_reason: Option<String>,

    /// Include when in summary
    pub is_summary: Option<bool>,

    /// ValueSet details if this is coded
    pub binding: Option<ElementDefinitionBinding>,

    /// Map element to another set of definitions
    pub mapping: Option<Vec<ElementDefinitionMapping>>,

    /// Additional content defined by implementations (Extension)
    pub extension: Option<Vec<Value>>,

    /// Extensions that cannot be ignored even if unrecognized
    pub modifier_extension: Option<Vec<Value>>,

    /// `_field` companion objects for primitive properties, keyed by
    /// property name, kept verbatim for lossless serialization.
    pub element_meta: BTreeMap<String, Value>,
}

/// Base definition information for an element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDefinitionBase {
    /// Path that identifies the base element
    pub path: String,

    /// Min cardinality of the base element
    pub min: u32,

    /// Max cardinality of the base element
    pub max: String,
}

/// Data type for an element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDefinitionType {
    /// Data type code
    pub code: String,

    /// Profiles (StructureDefinition canonical URLs) that apply
    pub profile: Option<Vec<String>>,

    /// Profiles for Reference/canonical target types
    pub target_profile: Option<Vec<String>>,

    /// Aggregation modes for references (contained | referenced | bundled)
    pub aggregation: Option<Vec<String>>,

    /// Versioning rule for references (either | independent | specific)
    pub versioning: Option<String>,

    /// `_field` companions for primitive properties of this type entry
    pub element_meta: BTreeMap<String, Value>,
}

impl ElementDefinitionType {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }
}

/// Example value for an element; `value` is a `value[x]` choice slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinitionExample {
    /// Describes the purpose of this example
    pub label: String,

    /// Value of example (one of the open type family)
    pub value: Option<ChoiceValue>,
}

/// Constraint on an element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinitionConstraint {
    /// Target of 'condition' reference
    pub key: String,

    /// Why this constraint is necessary or appropriate
    pub requirements: Option<String>,

    /// Severity (error | warning)
    pub severity: ConstraintSeverity,

    /// Human description of constraint
    pub human: String,

    /// FHIRPath expression of constraint
    pub expression: Option<String>,

    /// XPath expression of constraint
    pub xpath: Option<String>,

    /// Reference to original source of constraint
    pub source: Option<String>,
}

/// ValueSet binding for a coded element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinitionBinding {
    /// Binding strength (required | extensible | preferred | example)
    pub strength: BindingStrength,

    /// Human explanation of the value set
    pub description: Option<String>,

    /// Canonical reference to the value set
    pub value_set: Option<String>,
}

/// Mapping to another standard
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinitionMapping {
    /// Reference to mapping declaration
    pub identity: String,

    /// Computable language of mapping
    pub language: Option<String>,

    /// Details of the mapping
    pub map: String,

    /// Comments about the mapping
    pub comment: Option<String>,
}

/// Slicing information for an element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementDefinitionSlicing {
    /// Element values that are used to distinguish slices
    pub discriminator: Option<Vec<ElementDefinitionDiscriminator>>,

    /// Text description of how slicing works
    pub description: Option<String>,

    /// If elements must be in same order as slices
    pub ordered: Option<bool>,

    /// Slicing rules (closed | open | openAtEnd)
    pub rules: SlicingRules,
}

/// Discriminator for slicing
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinitionDiscriminator {
    /// Type of discriminator (value | exists | pattern | type | profile)
    pub discriminator_type: DiscriminatorType,

    /// Path to element value, relative to the sliced element
    pub path: String,
}

/// Snapshot - the fully resolved element list of a StructureDefinition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub element: Vec<ElementDefinition>,
}

/// Differential - the delta against the base definition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Differential {
    pub element: Vec<ElementDefinition>,
}

impl ElementDefinition {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Get the key for this element (path:sliceName for slices, just path otherwise)
    pub fn key(&self) -> String {
        if let Some(ref slice_name) = self.slice_name {
            format!("{}:{}", self.path, slice_name)
        } else {
            self.path.clone()
        }
    }

    /// Check if this element has a slice name
    pub fn is_slice(&self) -> bool {
        self.slice_name.is_some()
    }

    /// Get the parent path (everything before the last '.')
    pub fn parent_path(&self) -> Option<String> {
        self.path.rfind('.').map(|pos| self.path[..pos].to_string())
    }

    /// Check if this element is a descendant of the given path
    pub fn is_descendant_of(&self, parent_path: &str) -> bool {
        self.path.starts_with(parent_path)
            && self.path.len() > parent_path.len()
            && self.path.as_bytes().get(parent_path.len()) == Some(&b'.')
    }

    /// Check if this is a choice type element (path ends with [x])
    pub fn is_choice_type(&self) -> bool {
        self.path.ends_with("[x]")
    }

    /// Get type codes for this element
    pub fn type_codes(&self) -> Vec<String> {
        self.types
            .as_ref()
            .map(|types| types.iter().map(|t| t.code.clone()).collect())
            .unwrap_or_default()
    }

    /// Check if element is array/list (max = "*" or max > 1)
    pub fn is_array(&self) -> bool {
        self.max
            .as_ref()
            .map(|m| m == "*" || m.parse::<u32>().map(|n| n > 1).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Get the cardinality as a string (e.g., "0..1", "1..*")
    pub fn cardinality_string(&self) -> String {
        let min = self.min.unwrap_or(0);
        let max = self.max.as_deref().unwrap_or("*");
        format!("{}..{}", min, max)
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an element by path
    pub fn get_element(&self, path: &str) -> Option<&ElementDefinition> {
        self.element.iter().find(|e| e.path == path)
    }

    /// Get all direct children of a path
    pub fn get_children(&self, parent_path: &str) -> Vec<&ElementDefinition> {
        let expected_depth = parent_path.matches('.').count() + 1;
        self.element
            .iter()
            .filter(|e| {
                e.is_descendant_of(parent_path) && e.path.matches('.').count() == expected_depth
            })
            .collect()
    }
}

impl Differential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an element by path
    pub fn get_element(&self, path: &str) -> Option<&ElementDefinition> {
        self.element.iter().find(|e| e.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_key_includes_slice_name() {
        let mut elem = ElementDefinition::new("Patient.identifier");
        assert_eq!(elem.key(), "Patient.identifier");

        elem.slice_name = Some("mrn".to_string());
        assert_eq!(elem.key(), "Patient.identifier:mrn");
        assert!(elem.is_slice());
    }

    #[test]
    fn choice_type_detection() {
        let mut elem = ElementDefinition::new("Observation.value[x]");
        assert!(elem.is_choice_type());

        elem.path = "Observation.valueQuantity".to_string();
        assert!(!elem.is_choice_type());
    }

    #[test]
    fn descendant_checks_require_dot_boundary() {
        let elem = ElementDefinition::new("Patient.nameSuffix");
        assert!(!elem.is_descendant_of("Patient.name"));

        let elem = ElementDefinition::new("Patient.name.family");
        assert!(elem.is_descendant_of("Patient.name"));
        assert!(elem.is_descendant_of("Patient"));
    }

    #[test]
    fn cardinality_helpers() {
        let mut elem = ElementDefinition::new("Patient.name");
        elem.min = Some(1);
        elem.max = Some("*".to_string());
        assert_eq!(elem.cardinality_string(), "1..*");
        assert!(elem.is_array());

        elem.max = Some("1".to_string());
        assert!(!elem.is_array());
    }

    #[test]
    fn at_most_one_choice_value_per_slot() {
        let mut elem = ElementDefinition::new("Patient.gender");
        elem.fixed = Some(ChoiceValue::new("fixedCode", "code", json!("female")));
        // The slot holds exactly one variant; replacing it swaps the variant.
        elem.fixed = Some(ChoiceValue::new("fixedString", "string", json!("f")));
        assert_eq!(elem.fixed.as_ref().unwrap().type_name, "string");
    }

    #[test]
    fn snapshot_children_are_direct_only() {
        let snapshot = Snapshot {
            element: vec![
                ElementDefinition::new("Patient"),
                ElementDefinition::new("Patient.name"),
                ElementDefinition::new("Patient.name.family"),
                ElementDefinition::new("Patient.birthDate"),
            ],
        };
        let children = snapshot.get_children("Patient");
        let paths: Vec<&str> = children.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Patient.name", "Patient.birthDate"]);
    }
}
