//! Parse diagnostics
//!
//! Parsing accumulates [`ParseIssue`]s instead of throwing: error-severity
//! issues demote the result to [`ParseResult::Failure`], warnings never do.

use std::fmt;

/// Severity of a parse issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Machine-readable issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    InvalidJson,
    MissingResourceType,
    UnknownResourceType,
    InvalidPrimitive,
    InvalidStructure,
    InvalidChoiceType,
    MultipleChoiceValues,
    ArrayMismatch,
    UnexpectedNull,
    UnexpectedProperty,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::MissingResourceType => "MISSING_RESOURCE_TYPE",
            Self::UnknownResourceType => "UNKNOWN_RESOURCE_TYPE",
            Self::InvalidPrimitive => "INVALID_PRIMITIVE",
            Self::InvalidStructure => "INVALID_STRUCTURE",
            Self::InvalidChoiceType => "INVALID_CHOICE_TYPE",
            Self::MultipleChoiceValues => "MULTIPLE_CHOICE_VALUES",
            Self::ArrayMismatch => "ARRAY_MISMATCH",
            Self::UnexpectedNull => "UNEXPECTED_NULL",
            Self::UnexpectedProperty => "UNEXPECTED_PROPERTY",
        }
    }
}

/// A single parse diagnostic with a dotted JSON path (`$.snapshot.element[3].min`)
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub path: String,
}

impl ParseIssue {
    pub fn error(code: IssueCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} {} at {}: {}",
            severity,
            self.code.as_str(),
            self.path,
            self.message
        )
    }
}

/// True if any issue has error severity
pub fn has_errors(issues: &[ParseIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Outcome of a parse: `Success` carries data plus warnings only; `Failure`
/// carries at least one error-severity issue.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    Success { data: T, issues: Vec<ParseIssue> },
    Failure { issues: Vec<ParseIssue> },
}

impl<T> ParseResult<T> {
    /// Build a result from data and accumulated issues; any error-severity
    /// issue demotes the result to `Failure` and the data is dropped.
    pub fn new(data: T, issues: Vec<ParseIssue>) -> Self {
        if has_errors(&issues) {
            Self::Failure { issues }
        } else {
            Self::Success { data, issues }
        }
    }

    pub fn failure(issues: Vec<ParseIssue>) -> Self {
        debug_assert!(has_errors(&issues));
        Self::Failure { issues }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn issues(&self) -> &[ParseIssue] {
        match self {
            Self::Success { issues, .. } | Self::Failure { issues } => issues,
        }
    }

    pub fn has_errors(&self) -> bool {
        has_errors(self.issues())
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }
}
