//! Shared FHIR code enums
//!
//! Closed code systems used by the conformance models. Conversion to and from
//! wire codes is explicit (`as_code` / `from_code`) because the wire format
//! is owned by the parser, not serde.

/// Publication status of a conformance resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublicationStatus {
    #[default]
    Draft,
    Active,
    Retired,
    Unknown,
}

impl PublicationStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Retired => "retired",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "retired" => Some(Self::Retired),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Kind of structure a StructureDefinition describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructureDefinitionKind {
    PrimitiveType,
    ComplexType,
    #[default]
    Resource,
    Logical,
}

impl StructureDefinitionKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::PrimitiveType => "primitive-type",
            Self::ComplexType => "complex-type",
            Self::Resource => "resource",
            Self::Logical => "logical",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "primitive-type" => Some(Self::PrimitiveType),
            "complex-type" => Some(Self::ComplexType),
            "resource" => Some(Self::Resource),
            "logical" => Some(Self::Logical),
            _ => None,
        }
    }
}

/// How a type relates to its baseDefinition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDerivationRule {
    Specialization,
    Constraint,
}

impl TypeDerivationRule {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Specialization => "specialization",
            Self::Constraint => "constraint",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "specialization" => Some(Self::Specialization),
            "constraint" => Some(Self::Constraint),
            _ => None,
        }
    }
}

/// Binding strength for terminology bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl BindingStrength {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Extensible => "extensible",
            Self::Preferred => "preferred",
            Self::Example => "example",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "required" => Some(Self::Required),
            "extensible" => Some(Self::Extensible),
            "preferred" => Some(Self::Preferred),
            "example" => Some(Self::Example),
            _ => None,
        }
    }
}

/// Slicing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlicingRules {
    Closed,
    #[default]
    Open,
    OpenAtEnd,
}

impl SlicingRules {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::OpenAtEnd => "openAtEnd",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "closed" => Some(Self::Closed),
            "open" => Some(Self::Open),
            "openAtEnd" => Some(Self::OpenAtEnd),
            _ => None,
        }
    }

    /// Strictness rank: `open < openAtEnd < closed`. A differential may move
    /// rules toward `closed` but never back toward `open`.
    pub fn strictness(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::OpenAtEnd => 1,
            Self::Closed => 2,
        }
    }
}

/// Type of slicing discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminatorType {
    Value,
    Exists,
    Pattern,
    Type,
    Profile,
}

impl DiscriminatorType {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Exists => "exists",
            Self::Pattern => "pattern",
            Self::Type => "type",
            Self::Profile => "profile",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "value" => Some(Self::Value),
            "exists" => Some(Self::Exists),
            "pattern" => Some(Self::Pattern),
            "type" => Some(Self::Type),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }
}

/// Severity of an ElementDefinition constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSeverity {
    Error,
    Warning,
}

impl ConstraintSeverity {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}
