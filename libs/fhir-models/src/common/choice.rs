//! Choice-type (`field[x]`) values
//!
//! FHIR renders a polymorphic slot `field[x]` as a concrete JSON property
//! `field<Type>` (e.g. `fixedCode`, `minValueQuantity`). A [`ChoiceValue`]
//! records which variant was chosen so the slot can be restored exactly on
//! serialization.

use serde_json::Value;

/// The concrete variant chosen for a `field[x]` polymorphic slot.
///
/// Invariant: `property_name == base name + type suffix`, where the suffix is
/// the type name with its first letter uppercased.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceValue {
    /// Concrete JSON property name, e.g. `fixedCode`.
    pub property_name: String,

    /// FHIR type name of the chosen variant, e.g. `code` or `Quantity`.
    pub type_name: String,

    /// The raw JSON value of the property.
    pub value: Value,

    /// The `_<propertyName>` companion object, when the variant is a
    /// primitive carrying element metadata (`id`/`extension`).
    pub element_extension: Option<Value>,
}

impl ChoiceValue {
    pub fn new(
        property_name: impl Into<String>,
        type_name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            type_name: type_name.into(),
            value,
            element_extension: None,
        }
    }

    /// The base name of the slot this value fills (`fixedCode` -> `fixed`).
    pub fn base_name(&self) -> &str {
        let suffix_len = suffix_for_type(&self.type_name).len();
        &self.property_name[..self.property_name.len().saturating_sub(suffix_len)]
    }
}

/// The property-name suffix for a FHIR type: the type name with its first
/// letter uppercased (`code` -> `Code`, `Quantity` -> `Quantity`).
pub fn suffix_for_type(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
