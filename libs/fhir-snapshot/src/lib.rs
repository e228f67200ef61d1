//! FHIR StructureDefinition snapshot generation
//!
//! Walks a profile's `baseDefinition` chain and merges its differential
//! element list against the base snapshot, producing the fully-resolved
//! snapshot. Handles slicing (explicit and type slicing), choice-type
//! narrowing, and on-demand expansion of complex datatype children, with a
//! per-generator circular-dependency guard.
//!
//! # Example
//!
//! ```rust,no_run
//! use siderite_snapshot::{MapResolver, SnapshotGenerator};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let base_sd = unimplemented!();
//! # let profile_sd: siderite_models::StructureDefinition = unimplemented!();
//! let mut resolver = MapResolver::new();
//! resolver.register(base_sd);
//!
//! let mut generator = SnapshotGenerator::new(&mut resolver);
//! let outcome = generator.generate(&profile_sd)?;
//! assert!(outcome.structure_definition.has_snapshot());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod generator;
pub mod issue;
mod merge;
pub mod normalization;
mod slicing;

pub use context::{MapResolver, SdResolver};
pub use error::{Error, Result};
pub use generator::{SnapshotGenerator, SnapshotGeneratorOptions, SnapshotOutcome};
pub use issue::{SnapshotIssue, SnapshotIssueCode, SnapshotSeverity};
pub use normalization::assign_element_ids;
