//! Parse/serialize round-trip coverage

use serde_json::json;
use siderite_parse::{
    parse_structure_definition, parse_structure_definition_str, serialize_structure_definition,
    structure_definition_to_json_string,
};

#[test]
fn minimal_patient_sd_round_trips() {
    let input = json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/StructureDefinition/SimplePatient",
        "name": "SimplePatient",
        "status": "draft",
        "kind": "resource",
        "abstract": false,
        "type": "Patient"
    });

    let first = parse_structure_definition(&input);
    assert!(first.is_success(), "issues: {:?}", first.issues());
    let sd = first.data().unwrap();

    let serialized = serialize_structure_definition(sd);
    let second = parse_structure_definition(&serialized);
    assert!(second.is_success(), "issues: {:?}", second.issues());
    let sd2 = second.data().unwrap();

    assert_eq!(sd2.url, sd.url);
    assert_eq!(sd2.name, sd.name);
    assert_eq!(sd2.kind, sd.kind);
    assert_eq!(sd2.is_abstract, sd.is_abstract);
    assert_eq!(sd2.type_, sd.type_);
    assert_eq!(sd2, sd);
}

#[test]
fn choice_slots_reappear_exactly_after_round_trip() {
    let input = json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/StructureDefinition/ChoiceTest",
        "name": "ChoiceTest",
        "status": "active",
        "kind": "resource",
        "abstract": false,
        "type": "Observation",
        "differential": {
            "element": [{
                "path": "Observation.value[x]",
                "defaultValueInteger": 0,
                "fixedUri": "http://x",
                "minValueQuantity": {"value": 0}
            }]
        }
    });

    let parsed = parse_structure_definition(&input);
    assert!(parsed.is_success(), "issues: {:?}", parsed.issues());
    let serialized = serialize_structure_definition(parsed.data().unwrap());

    let elem = &serialized["differential"]["element"][0];
    assert_eq!(elem["defaultValueInteger"], json!(0));
    assert_eq!(elem["fixedUri"], json!("http://x"));
    assert_eq!(elem["minValueQuantity"], json!({"value": 0}));
    assert!(elem.get("defaultValue").is_none());
    assert!(elem.get("fixed").is_none());
    assert!(elem.get("minValue").is_none());

    let reparsed = parse_structure_definition(&serialized);
    assert_eq!(reparsed.data(), parsed.data());
}

#[test]
fn primitive_element_metadata_round_trips() {
    let input = json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/StructureDefinition/MetaTest",
        "name": "MetaTest",
        "status": "active",
        "kind": "resource",
        "abstract": false,
        "type": "Patient",
        "publisher": "Example Org",
        "_publisher": {
            "extension": [{"url": "http://example.org/origin", "valueCode": "generated"}]
        }
    });

    let parsed = parse_structure_definition(&input);
    assert!(parsed.is_success());
    let serialized = serialize_structure_definition(parsed.data().unwrap());
    assert_eq!(serialized["publisher"], json!("Example Org"));
    assert_eq!(serialized["_publisher"], input["_publisher"]);

    let reparsed = parse_structure_definition(&serialized);
    assert_eq!(reparsed.data(), parsed.data());
}

#[test]
fn serialized_property_order_is_stable() {
    let input = json!({
        "resourceType": "StructureDefinition",
        "type": "Patient",
        "abstract": false,
        "kind": "resource",
        "status": "draft",
        "name": "OrderTest",
        "url": "http://example.org/StructureDefinition/OrderTest",
        "version": "1.0.0",
        "description": "property order fixture"
    });

    let parsed = parse_structure_definition(&input);
    let serialized = serialize_structure_definition(parsed.data().unwrap());
    let keys: Vec<&str> = serialized
        .as_object()
        .unwrap()
        .keys()
        .map(|k| k.as_str())
        .collect();

    assert_eq!(keys[0], "resourceType");
    let rest = &keys[1..];
    let mut sorted = rest.to_vec();
    sorted.sort();
    assert_eq!(rest, sorted.as_slice());

    // Serializing twice yields byte-identical text
    let text1 = structure_definition_to_json_string(parsed.data().unwrap());
    let text2 = structure_definition_to_json_string(parsed.data().unwrap());
    assert_eq!(text1, text2);
}

#[test]
fn slicing_and_constraints_round_trip() {
    let input = json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/StructureDefinition/SliceTest",
        "name": "SliceTest",
        "status": "active",
        "kind": "resource",
        "abstract": false,
        "type": "Patient",
        "differential": {
            "element": [
                {
                    "path": "Patient.identifier",
                    "slicing": {
                        "discriminator": [{"type": "value", "path": "system"}],
                        "ordered": false,
                        "rules": "open"
                    },
                    "min": 1
                },
                {
                    "path": "Patient.identifier",
                    "sliceName": "mrn",
                    "min": 1,
                    "max": "1",
                    "constraint": [{
                        "key": "mrn-1",
                        "severity": "error",
                        "human": "MRN requires a system",
                        "expression": "system.exists()"
                    }]
                }
            ]
        }
    });

    let parsed = parse_structure_definition(&input);
    assert!(parsed.is_success(), "issues: {:?}", parsed.issues());
    let serialized = serialize_structure_definition(parsed.data().unwrap());
    let reparsed = parse_structure_definition(&serialized);
    assert_eq!(reparsed.data(), parsed.data());

    let root = &serialized["differential"]["element"][0];
    assert_eq!(root["slicing"]["rules"], json!("open"));
    assert_eq!(
        root["slicing"]["discriminator"][0],
        json!({"type": "value", "path": "system"})
    );
}

#[test]
fn failure_keeps_no_data_and_reports_errors() {
    let result = parse_structure_definition_str("{\"resourceType\": \"StructureDefinition\"}");
    assert!(!result.is_success());
    assert!(result.has_errors());
    assert!(result.data().is_none());
}
