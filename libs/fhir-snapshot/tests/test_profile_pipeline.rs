//! Parse -> generate -> serialize pipeline

use serde_json::json;
use siderite_parse::{parse_structure_definition, serialize_structure_definition};
use siderite_snapshot::{MapResolver, SdResolver, SnapshotGenerator};

fn base_patient_json() -> serde_json::Value {
    json!({
        "resourceType": "StructureDefinition",
        "url": "http://hl7.org/fhir/StructureDefinition/Patient",
        "name": "Patient",
        "status": "active",
        "kind": "resource",
        "abstract": false,
        "type": "Patient",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource",
        "derivation": "specialization",
        "snapshot": {
            "element": [
                {"path": "Patient", "min": 0, "max": "*"},
                {"path": "Patient.name", "min": 0, "max": "*",
                    "type": [{"code": "HumanName"}]},
                {"path": "Patient.birthDate", "min": 0, "max": "1",
                    "type": [{"code": "date"}]}
            ]
        }
    })
}

fn profile_json() -> serde_json::Value {
    json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/StructureDefinition/PipelinePatient",
        "name": "PipelinePatient",
        "status": "draft",
        "kind": "resource",
        "abstract": false,
        "type": "Patient",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Patient",
        "derivation": "constraint",
        "differential": {
            "element": [
                {"path": "Patient.name", "min": 1, "mustSupport": true}
            ]
        }
    })
}

#[test]
fn parsed_profile_generates_and_reserializes_cleanly() {
    let base = parse_structure_definition(&base_patient_json());
    assert!(base.is_success(), "base issues: {:?}", base.issues());
    let profile = parse_structure_definition(&profile_json());
    assert!(profile.is_success(), "profile issues: {:?}", profile.issues());

    let mut resolver = MapResolver::new();
    resolver.register(base.into_data().unwrap());

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(profile.data().unwrap()).unwrap();
    assert!(outcome.issues.is_empty(), "issues: {:?}", outcome.issues);

    let generated = outcome.structure_definition;
    let snapshot = generated.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.element.len(), 3);
    let name = snapshot.get_element("Patient.name").unwrap();
    assert_eq!(name.min, Some(1));
    assert_eq!(name.must_support, Some(true));

    // The generated definition serializes and parses back without errors
    let serialized = serialize_structure_definition(&generated);
    assert_eq!(serialized["resourceType"], json!("StructureDefinition"));
    assert_eq!(
        serialized["snapshot"]["element"][1]["mustSupport"],
        json!(true)
    );
    let reparsed = parse_structure_definition(&serialized);
    assert!(reparsed.is_success(), "issues: {:?}", reparsed.issues());
    assert_eq!(
        reparsed.data().unwrap().snapshot,
        generated.snapshot,
    );
}
