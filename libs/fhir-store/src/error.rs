//! Error types for the resource repository

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Resource deleted: {resource_type}/{id}")]
    ResourceGone { resource_type: String, id: String },

    #[error("Version conflict on {resource_type}/{id}")]
    VersionConflict { resource_type: String, id: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn not_found(resource_type: &str, id: impl ToString) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn gone(resource_type: &str, id: impl ToString) -> Self {
        Self::ResourceGone {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(resource_type: &str, id: impl ToString) -> Self {
        Self::VersionConflict {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }
}
