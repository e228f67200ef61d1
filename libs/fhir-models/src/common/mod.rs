//! FHIR R4 conformance models

pub mod choice;
pub mod complex;
pub mod element_definition;
pub mod structure_definition;

// Re-export commonly used types
pub use choice::*;
pub use complex::*;
pub use element_definition::*;
pub use structure_definition::*;
