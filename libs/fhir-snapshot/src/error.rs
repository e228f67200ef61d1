//! Error types for snapshot generation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("StructureDefinition is missing a canonical url")]
    MissingUrl,

    #[error("StructureDefinition {0} has no baseDefinition and is not a root type")]
    MissingBaseDefinition(String),

    #[error("Circular baseDefinition dependency involving {0}")]
    CircularDependency(String),

    #[error("Base StructureDefinition not found: {0}")]
    BaseNotFound(String),

    #[error("Differential element(s) not consumed: {0}")]
    UnconsumedDifferential(String),

    #[error("Slicing error: {0}")]
    Slicing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
