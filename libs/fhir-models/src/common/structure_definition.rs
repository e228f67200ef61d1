//! FHIR StructureDefinition model
//!
//! StructureDefinition declares the structure, constraints and terminology
//! bindings for a FHIR resource or data type (R4).

use super::complex::*;
use super::element_definition::{Differential, ElementDefinition, Snapshot};
use serde_json::Value;
use std::collections::BTreeMap;

/// FHIR StructureDefinition resource
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructureDefinition {
    /// Logical id of this artifact
    pub id: Option<String>,

    /// Metadata about the resource (meta.versionId, meta.lastUpdated, ...)
    pub meta: Option<Value>,

    /// A set of rules under which this content was created
    pub implicit_rules: Option<String>,

    /// Language of the resource content
    pub language: Option<String>,

    /// Text summary of the resource, for human interpretation
    pub text: Option<Value>,

    /// Contained, inline resources
    pub contained: Option<Vec<Value>>,

    /// Additional content defined by implementations
    pub extension: Option<Vec<Value>>,

    /// Extensions that cannot be ignored
    pub modifier_extension: Option<Vec<Value>>,

    /// Canonical identifier for this structure definition (unique globally)
    pub url: String,

    /// Additional identifiers for the structure definition
    pub identifier: Option<Vec<Value>>,

    /// Business version of the structure definition
    pub version: Option<String>,

    /// Name for this structure definition (computer friendly)
    pub name: String,

    /// Name for this structure definition (human friendly)
    pub title: Option<String>,

    /// Publication status (draft | active | retired | unknown)
    pub status: PublicationStatus,

    /// For testing purposes, not real usage
    pub experimental: Option<bool>,

    /// Date last changed
    pub date: Option<String>,

    /// Name of the publisher (organization or individual)
    pub publisher: Option<String>,

    /// Contact details for the publisher (ContactDetail)
    pub contact: Option<Vec<Value>>,

    /// Natural language description of the structure definition
    pub description: Option<String>,

    /// The context that the content is intended to support (UsageContext)
    pub use_context: Option<Vec<Value>>,

    /// Intended jurisdiction for structure definition (CodeableConcept)
    pub jurisdiction: Option<Vec<Value>>,

    /// Why this structure definition is defined
    pub purpose: Option<String>,

    /// Use and/or publishing restrictions
    pub copyright: Option<String>,

    /// Assist with indexing and finding (Coding)
    pub keyword: Option<Vec<Value>>,

    /// FHIR Version this StructureDefinition targets
    pub fhir_version: Option<String>,

    /// External specifications that this structure maps to
    pub mapping: Option<Vec<StructureDefinitionMapping>>,

    /// Kind of structure (primitive-type | complex-type | resource | logical)
    pub kind: StructureDefinitionKind,

    /// Whether this is an abstract type
    pub is_abstract: bool,

    /// If an extension, where it can be used
    pub context: Option<Vec<StructureDefinitionContext>>,

    /// FHIRPath invariants that apply to the extension context
    pub context_invariant: Option<Vec<String>>,

    /// Type defined or constrained by this structure
    pub type_: String,

    /// Definition that this type is constrained/specialized from
    pub base_definition: Option<String>,

    /// Derivation type (specialization | constraint)
    pub derivation: Option<TypeDerivationRule>,

    /// Snapshot view of the structure
    pub snapshot: Option<Snapshot>,

    /// Differential view of the structure
    pub differential: Option<Differential>,

    /// `_field` companion objects for primitive properties, keyed by
    /// property name, kept verbatim for lossless serialization.
    pub element_meta: BTreeMap<String, Value>,
}

/// Mapping to another standard/specification
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDefinitionMapping {
    /// Internal id when this mapping is used
    pub identity: String,

    /// Identifies what this mapping refers to
    pub uri: Option<String>,

    /// Names what this mapping refers to
    pub name: Option<String>,

    /// Versions, issues, scope limitations, etc.
    pub comment: Option<String>,
}

/// Context where an extension can be used
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDefinitionContext {
    /// Type of context (fhirpath | element | extension)
    pub context_type: String,

    /// FHIRPath expression or element id
    pub expression: String,
}

impl StructureDefinition {
    /// Create a new StructureDefinition with minimal required fields
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        kind: StructureDefinitionKind,
        type_: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            kind,
            type_: type_.into(),
            ..Default::default()
        }
    }

    /// Get the root element from snapshot
    pub fn get_root_element(&self) -> Option<&ElementDefinition> {
        self.snapshot.as_ref().and_then(|s| s.element.first())
    }

    /// Get element by path from snapshot
    pub fn get_element_by_path(&self, path: &str) -> Option<&ElementDefinition> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.element.iter().find(|e| e.path == path))
    }

    /// Check if this is a resource definition
    pub fn is_resource(&self) -> bool {
        self.kind == StructureDefinitionKind::Resource
    }

    /// Check if this is an extension definition
    pub fn is_extension(&self) -> bool {
        self.type_ == "Extension"
    }

    /// Check if this is a profile (constraint on another definition)
    pub fn is_profile(&self) -> bool {
        self.derivation == Some(TypeDerivationRule::Constraint)
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn has_differential(&self) -> bool {
        self.differential.is_some()
    }

    /// Get the version with the URL (canonical|version format)
    pub fn get_versioned_url(&self) -> String {
        match &self.version {
            Some(v) => format!("{}|{}", self.url, v),
            None => self.url.clone(),
        }
    }

    /// Get base type name (strips canonical URL)
    pub fn get_base_type_name(&self) -> Option<String> {
        self.base_definition
            .as_ref()
            .and_then(|url| url.rsplit('/').next().map(|s| s.to_string()))
    }
}
