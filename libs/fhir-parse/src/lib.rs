//! FHIR JSON parsing and serialization for conformance resources
//!
//! This crate reads and writes FHIR R4 StructureDefinitions with a
//! diagnostics-accumulating parser: malformed input produces
//! [`ParseIssue`]s on a [`ParseResult`] instead of aborting at the first
//! problem. The serializer is the exact inverse, with stable property
//! ordering (`resourceType` first, the rest alphabetical) so round-trips
//! are textually comparable.
//!
//! The three wire-format quirks this crate owns:
//! - **Choice types**: `field[x]` slots arrive as `field<Type>` properties
//!   and are extracted into `ChoiceValue`s (`choice` module).
//! - **Primitive element split**: a primitive `field` may carry a `_field`
//!   companion with `id`/`extension` metadata (`primitives` module).
//! - **Array alignment**: primitive arrays and their `_field` companions
//!   align index-by-index, with `null` placeholders on either side.

pub mod choice;
pub mod complex;
pub mod issue;
pub mod primitives;
pub mod serializer;
pub mod structure_definition;

pub use choice::{choice_fields_for, extract_all_choice_values, extract_choice_value, ChoiceField};
pub use complex::{parse_object, ParsedObject, PropertyKind, PropertySpec};
pub use issue::{has_errors, IssueCode, ParseIssue, ParseResult, Severity};
pub use primitives::{merge_primitive_array, merge_primitive_element, validate_primitive};
pub use serializer::{serialize_structure_definition, structure_definition_to_json_string};
pub use structure_definition::{parse_structure_definition, parse_structure_definition_str};
