//! Snapshot generation diagnostics
//!
//! Non-strict generation accumulates [`SnapshotIssue`]s; strict mode
//! (`throw_on_error`) converts the first error-severity issue into a typed
//! [`crate::Error`] instead.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotIssueCode {
    DifferentialNotConsumed,
    SlicingError,
    BaseNotFound,
    InternalError,
    RecursionLimit,
}

impl SnapshotIssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DifferentialNotConsumed => "DIFFERENTIAL_NOT_CONSUMED",
            Self::SlicingError => "SLICING_ERROR",
            Self::BaseNotFound => "BASE_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
            Self::RecursionLimit => "RECURSION_LIMIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotIssue {
    pub severity: SnapshotSeverity,
    pub code: SnapshotIssueCode,
    pub message: String,
    pub path: String,
}

impl SnapshotIssue {
    pub fn error(
        code: SnapshotIssueCode,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            severity: SnapshotSeverity::Error,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn warning(
        code: SnapshotIssueCode,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            severity: SnapshotSeverity::Warning,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == SnapshotSeverity::Error
    }
}
