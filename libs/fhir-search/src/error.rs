//! Error types for search planning

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid SearchParameter bundle: {0}")]
    InvalidBundle(String),

    #[error("Unknown search parameter: {resource_type}.{code}")]
    UnknownParameter { resource_type: String, code: String },

    #[error("Unsupported modifier \"{modifier}\" for parameter {code}")]
    UnsupportedModifier { code: String, modifier: String },

    #[error("Invalid search value \"{value}\" for parameter {code}: {reason}")]
    InvalidValue {
        code: String,
        value: String,
        reason: String,
    },

    #[error("Chained search requires a reference parameter: {0}")]
    InvalidChain(String),
}
