//! StructureDefinition resolution
//!
//! The generator looks up base and datatype StructureDefinitions by
//! canonical URL through [`SdResolver`]. The map is read-mostly: the
//! generator registers freshly generated snapshots back into it so
//! descendants reuse them without regeneration.

use siderite_models::StructureDefinition;
use std::collections::HashMap;

/// Access to StructureDefinitions by canonical URL.
pub trait SdResolver {
    /// Resolve a StructureDefinition by canonical URL.
    fn resolve(&self, url: &str) -> Option<StructureDefinition>;

    /// Register a StructureDefinition (typically one whose snapshot was just
    /// generated), replacing any prior entry for its URL.
    fn register(&mut self, sd: StructureDefinition);
}

/// In-memory URL -> StructureDefinition map.
#[derive(Debug, Default)]
pub struct MapResolver {
    map: HashMap<String, StructureDefinition>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.map.contains_key(url)
    }
}

impl SdResolver for MapResolver {
    fn resolve(&self, url: &str) -> Option<StructureDefinition> {
        self.map.get(url).cloned()
    }

    fn register(&mut self, sd: StructureDefinition) {
        self.map.insert(sd.url.clone(), sd);
    }
}

/// Canonical URL for a FHIR core type code (e.g. `Identifier`).
pub(crate) fn canonical_url_for_type(code: &str) -> String {
    if code.starts_with("http://") || code.starts_with("https://") {
        code.to_string()
    } else {
        format!("http://hl7.org/fhir/StructureDefinition/{}", code)
    }
}
