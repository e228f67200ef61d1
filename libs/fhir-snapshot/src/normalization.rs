//! Element id normalization
//!
//! Assigns every snapshot element the canonical R4 element id: dot-joined
//! path segments with `:sliceName` suffixes, slice names propagating to
//! descendant ids (`Patient.identifier:mrn.system`).

use siderite_models::ElementDefinition;
use std::collections::HashMap;

/// Assign canonical ids to every element, overwriting existing ids.
///
/// Elements must be in depth-first order with slice descendants following
/// their slice root, which is what the merger emits.
pub fn assign_element_ids(elements: &mut [ElementDefinition]) {
    // Maps a path to the id of the most recent element emitted at that path,
    // so descendants of a slice pick up the `path:slice` prefix.
    let mut id_by_path: HashMap<String, String> = HashMap::new();

    for elem in elements.iter_mut() {
        let mut id = match elem.path.rfind('.') {
            None => elem.path.clone(),
            Some(pos) => {
                let parent_path = &elem.path[..pos];
                let segment = &elem.path[pos + 1..];
                let parent_id = id_by_path
                    .get(parent_path)
                    .cloned()
                    .unwrap_or_else(|| parent_path.to_string());
                format!("{}.{}", parent_id, segment)
            }
        };
        if let Some(slice_name) = &elem.slice_name {
            id = format!("{}:{}", id, slice_name);
        }
        elem.id = Some(id.clone());
        id_by_path.insert(elem.path.clone(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_element(path: &str, slice_name: Option<&str>) -> ElementDefinition {
        let mut elem = ElementDefinition::new(path);
        elem.slice_name = slice_name.map(|s| s.to_string());
        elem
    }

    #[test]
    fn plain_paths_get_path_ids() {
        let mut elements = vec![
            make_element("Patient", None),
            make_element("Patient.name", None),
            make_element("Patient.name.family", None),
        ];
        assign_element_ids(&mut elements);
        assert_eq!(elements[0].id.as_deref(), Some("Patient"));
        assert_eq!(elements[1].id.as_deref(), Some("Patient.name"));
        assert_eq!(elements[2].id.as_deref(), Some("Patient.name.family"));
    }

    #[test]
    fn slice_names_join_with_colon_and_propagate() {
        let mut elements = vec![
            make_element("Patient", None),
            make_element("Patient.identifier", None),
            make_element("Patient.identifier", Some("mrn")),
            make_element("Patient.identifier.system", None),
            make_element("Patient.identifier", Some("ssn")),
            make_element("Patient.identifier.system", None),
        ];
        assign_element_ids(&mut elements);
        assert_eq!(elements[2].id.as_deref(), Some("Patient.identifier:mrn"));
        assert_eq!(
            elements[3].id.as_deref(),
            Some("Patient.identifier:mrn.system")
        );
        assert_eq!(elements[4].id.as_deref(), Some("Patient.identifier:ssn"));
        assert_eq!(
            elements[5].id.as_deref(),
            Some("Patient.identifier:ssn.system")
        );
    }

    #[test]
    fn existing_ids_are_overwritten() {
        let mut elem = make_element("Patient", None);
        elem.id = Some("bogus".to_string());
        let mut elements = vec![elem];
        assign_element_ids(&mut elements);
        assert_eq!(elements[0].id.as_deref(), Some("Patient"));
    }
}
