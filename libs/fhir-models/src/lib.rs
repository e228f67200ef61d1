//! FHIR data models
//!
//! Strongly-typed Rust structures for the FHIR R4 conformance layer:
//! StructureDefinition, ElementDefinition and the complex types they embed.
//!
//! # Design Philosophy
//!
//! - **Parser-owned wire format**: these structs do not derive serde for the
//!   FHIR JSON wire format. Parsing and serialization live in
//!   `siderite-parse`, which handles choice-type polymorphism and the
//!   primitive `_field` element split losslessly. Deriving serde here would
//!   push the `fixed[x]`/`pattern[x]` family through `#[serde(flatten)]`
//!   catch-alls and require repair passes afterwards.
//! - **Choice slots are first-class**: a `field[x]` slot is a [`ChoiceValue`]
//!   carrying the chosen type name, the raw value, and any primitive
//!   element metadata.
//! - **Lossless companions**: `_field` companion objects are kept verbatim
//!   in per-struct `element_meta` maps so serialization can restore them.

pub mod common;

// Re-export commonly used types
pub use common::*;
