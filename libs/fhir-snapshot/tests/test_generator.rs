//! End-to-end snapshot generation tests

use siderite_models::*;
use siderite_snapshot::{
    Error, MapResolver, SdResolver, SnapshotGenerator, SnapshotGeneratorOptions, SnapshotIssueCode,
};

const FHIR_SD: &str = "http://hl7.org/fhir/StructureDefinition";

fn element(path: &str, min: u32, max: &str) -> ElementDefinition {
    let mut elem = ElementDefinition::new(path);
    elem.min = Some(min);
    elem.max = Some(max.to_string());
    elem
}

fn typed_element(path: &str, min: u32, max: &str, type_code: &str) -> ElementDefinition {
    let mut elem = element(path, min, max);
    elem.types = Some(vec![ElementDefinitionType::new(type_code)]);
    elem
}

fn patient_base() -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        format!("{}/Patient", FHIR_SD),
        "Patient",
        StructureDefinitionKind::Resource,
        "Patient",
    );
    sd.base_definition = Some(format!("{}/DomainResource", FHIR_SD));
    sd.derivation = Some(TypeDerivationRule::Specialization);
    sd.snapshot = Some(Snapshot {
        element: vec![
            element("Patient", 0, "*"),
            typed_element("Patient.identifier", 0, "*", "Identifier"),
            typed_element("Patient.name", 0, "*", "HumanName"),
            typed_element("Patient.gender", 0, "1", "code"),
            typed_element("Patient.birthDate", 0, "1", "date"),
        ],
    });
    sd
}

fn identifier_datatype() -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        format!("{}/Identifier", FHIR_SD),
        "Identifier",
        StructureDefinitionKind::ComplexType,
        "Identifier",
    );
    sd.base_definition = Some(format!("{}/Element", FHIR_SD));
    sd.snapshot = Some(Snapshot {
        element: vec![
            element("Identifier", 0, "*"),
            typed_element("Identifier.use", 0, "1", "code"),
            typed_element("Identifier.system", 0, "1", "uri"),
            typed_element("Identifier.value", 0, "1", "string"),
            typed_element("Identifier.period", 0, "1", "Period"),
        ],
    });
    sd
}

fn period_datatype() -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        format!("{}/Period", FHIR_SD),
        "Period",
        StructureDefinitionKind::ComplexType,
        "Period",
    );
    sd.base_definition = Some(format!("{}/Element", FHIR_SD));
    sd.snapshot = Some(Snapshot {
        element: vec![
            element("Period", 0, "*"),
            typed_element("Period.start", 0, "1", "dateTime"),
            typed_element("Period.end", 0, "1", "dateTime"),
        ],
    });
    sd
}

fn observation_base() -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        format!("{}/Observation", FHIR_SD),
        "Observation",
        StructureDefinitionKind::Resource,
        "Observation",
    );
    sd.base_definition = Some(format!("{}/DomainResource", FHIR_SD));
    sd.snapshot = Some(Snapshot {
        element: vec![element("Observation", 0, "*"), {
            let mut value = element("Observation.value[x]", 0, "1");
            value.types = Some(vec![
                ElementDefinitionType::new("Quantity"),
                ElementDefinitionType::new("CodeableConcept"),
                ElementDefinitionType::new("string"),
            ]);
            value
        }],
    });
    sd
}

fn profile(url: &str, base: &str, differential: Vec<ElementDefinition>) -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        url,
        "TestProfile",
        StructureDefinitionKind::Resource,
        "Patient",
    );
    sd.base_definition = Some(base.to_string());
    sd.derivation = Some(TypeDerivationRule::Constraint);
    sd.differential = Some(Differential {
        element: differential,
    });
    sd
}

#[test]
fn single_constraint_preserves_all_other_elements() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    let mut diff_name = ElementDefinition::new("Patient.name");
    diff_name.min = Some(1);
    diff_name.must_support = Some(true);
    let p = profile(
        "http://example.org/StructureDefinition/P",
        &format!("{}/Patient", FHIR_SD),
        vec![diff_name],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).expect("generation succeeds");
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let base_count = patient_base().snapshot.unwrap().element.len();
    assert_eq!(snapshot.element.len(), base_count);

    let name = snapshot.get_element("Patient.name").unwrap();
    assert_eq!(name.min, Some(1));
    assert_eq!(name.must_support, Some(true));
    // Untouched elements keep base values
    let gender = snapshot.get_element("Patient.gender").unwrap();
    assert_eq!(gender.min, Some(0));
    assert_eq!(gender.max.as_deref(), Some("1"));
    assert_eq!(gender.must_support, None);
}

#[test]
fn every_merged_element_carries_base_traceability() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    let mut diff_name = ElementDefinition::new("Patient.name");
    diff_name.min = Some(1);
    let p = profile(
        "http://example.org/StructureDefinition/P",
        &format!("{}/Patient", FHIR_SD),
        vec![diff_name],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let base = patient_base();
    let base_paths: Vec<&str> = base
        .snapshot
        .as_ref()
        .unwrap()
        .element
        .iter()
        .map(|e| e.path.as_str())
        .collect();

    for elem in &outcome.structure_definition.snapshot.unwrap().element {
        let trace = elem
            .base
            .as_ref()
            .unwrap_or_else(|| panic!("element {} missing base", elem.path));
        assert!(
            base_paths.contains(&trace.path.as_str()),
            "base path {} not in input base",
            trace.path
        );
    }
}

#[test]
fn explicit_slicing_emits_root_then_slices_in_order() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    let mut root = ElementDefinition::new("Patient.identifier");
    root.slicing = Some(ElementDefinitionSlicing {
        discriminator: Some(vec![ElementDefinitionDiscriminator {
            discriminator_type: DiscriminatorType::Value,
            path: "system".to_string(),
        }]),
        description: None,
        ordered: Some(false),
        rules: SlicingRules::Open,
    });
    let mut mrn = element("Patient.identifier", 1, "1");
    mrn.slice_name = Some("mrn".to_string());
    let mut ssn = element("Patient.identifier", 0, "1");
    ssn.slice_name = Some("ssn".to_string());

    let p = profile(
        "http://example.org/StructureDefinition/SlicedPatient",
        &format!("{}/Patient", FHIR_SD),
        vec![root, mrn, ssn],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).expect("generation succeeds");
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let identifier_elements: Vec<&ElementDefinition> = snapshot
        .element
        .iter()
        .filter(|e| e.path == "Patient.identifier")
        .collect();
    assert_eq!(identifier_elements.len(), 3);

    let root = identifier_elements[0];
    assert!(root.slice_name.is_none());
    let disc = &root.slicing.as_ref().unwrap().discriminator.as_ref().unwrap()[0];
    assert_eq!(disc.discriminator_type, DiscriminatorType::Value);
    assert_eq!(disc.path, "system");

    assert_eq!(identifier_elements[1].slice_name.as_deref(), Some("mrn"));
    assert_eq!(identifier_elements[1].min, Some(1));
    assert_eq!(identifier_elements[1].max.as_deref(), Some("1"));
    assert_eq!(identifier_elements[2].slice_name.as_deref(), Some("ssn"));
    assert_eq!(identifier_elements[2].min, Some(0));

    // Slice ids are normalized
    assert_eq!(
        identifier_elements[1].id.as_deref(),
        Some("Patient.identifier:mrn")
    );
}

fn sliced_patient_base() -> StructureDefinition {
    let mut sd = StructureDefinition::new(
        "http://example.org/StructureDefinition/SlicedBase",
        "SlicedBase",
        StructureDefinitionKind::Resource,
        "Patient",
    );
    sd.base_definition = Some(format!("{}/Patient", FHIR_SD));
    let mut root = typed_element("Patient.identifier", 0, "*", "Identifier");
    root.slicing = Some(ElementDefinitionSlicing {
        discriminator: Some(vec![ElementDefinitionDiscriminator {
            discriminator_type: DiscriminatorType::Value,
            path: "system".to_string(),
        }]),
        description: None,
        ordered: Some(false),
        rules: SlicingRules::Open,
    });
    let mut mrn = typed_element("Patient.identifier", 0, "1", "Identifier");
    mrn.slice_name = Some("mrn".to_string());
    sd.snapshot = Some(Snapshot {
        element: vec![
            element("Patient", 0, "*"),
            root,
            mrn,
            typed_element("Patient.gender", 0, "1", "code"),
        ],
    });
    sd
}

#[test]
fn existing_slices_merge_by_slice_name_and_new_slices_append() {
    let mut resolver = MapResolver::new();
    resolver.register(sliced_patient_base());

    let mut mrn_diff = element("Patient.identifier", 1, "1");
    mrn_diff.slice_name = Some("mrn".to_string());
    mrn_diff.must_support = Some(true);
    let mut ssn_diff = element("Patient.identifier", 0, "1");
    ssn_diff.slice_name = Some("ssn".to_string());

    let p = profile(
        "http://example.org/StructureDefinition/MoreSlices",
        "http://example.org/StructureDefinition/SlicedBase",
        vec![mrn_diff, ssn_diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).expect("generation succeeds");
    assert!(
        !outcome
            .issues
            .iter()
            .any(|i| i.code == SnapshotIssueCode::SlicingError),
        "issues: {:?}",
        outcome.issues
    );
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let identifier_elements: Vec<&ElementDefinition> = snapshot
        .element
        .iter()
        .filter(|e| e.path == "Patient.identifier")
        .collect();
    // Root, merged mrn, appended ssn
    assert_eq!(identifier_elements.len(), 3);
    assert!(identifier_elements[0].slicing.is_some());

    let mrn = identifier_elements[1];
    assert_eq!(mrn.slice_name.as_deref(), Some("mrn"));
    assert_eq!(mrn.min, Some(1));
    assert_eq!(mrn.must_support, Some(true));

    let ssn = identifier_elements[2];
    assert_eq!(ssn.slice_name.as_deref(), Some("ssn"));
    // Slices never carry the slicing descriptor themselves
    assert!(mrn.slicing.is_none());
    assert!(ssn.slicing.is_none());
}

#[test]
fn closed_slicing_rejects_new_slices() {
    let mut resolver = MapResolver::new();
    let mut base = sliced_patient_base();
    if let Some(snapshot) = base.snapshot.as_mut() {
        if let Some(root) = snapshot.element.iter_mut().find(|e| e.slicing.is_some()) {
            root.slicing.as_mut().unwrap().rules = SlicingRules::Closed;
        }
    }
    resolver.register(base);

    let mut ssn_diff = element("Patient.identifier", 0, "1");
    ssn_diff.slice_name = Some("ssn".to_string());
    let p = profile(
        "http://example.org/StructureDefinition/ClosedSlices",
        "http://example.org/StructureDefinition/SlicedBase",
        vec![ssn_diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).expect("non-strict mode continues");
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.code == SnapshotIssueCode::SlicingError));
    // The rejected slice is not appended
    let snapshot = outcome.structure_definition.snapshot.unwrap();
    assert!(!snapshot
        .element
        .iter()
        .any(|e| e.slice_name.as_deref() == Some("ssn")));
}

#[test]
fn choice_narrowing_collapses_type_list() {
    let mut resolver = MapResolver::new();
    resolver.register(observation_base());

    let mut p = profile(
        "http://example.org/StructureDefinition/QuantityOnly",
        &format!("{}/Observation", FHIR_SD),
        vec![ElementDefinition::new("Observation.valueQuantity")],
    );
    p.type_ = "Observation".to_string();

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let value = snapshot.get_element("Observation.valueQuantity").unwrap();
    let types = value.types.as_ref().unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].code, "Quantity");
    assert!(snapshot.get_element("Observation.value[x]").is_none());
}

#[test]
fn two_choice_variants_synthesize_type_slicing() {
    let mut resolver = MapResolver::new();
    resolver.register(observation_base());

    let mut p = profile(
        "http://example.org/StructureDefinition/TwoValues",
        &format!("{}/Observation", FHIR_SD),
        vec![
            ElementDefinition::new("Observation.valueQuantity"),
            ElementDefinition::new("Observation.valueString"),
        ],
    );
    p.type_ = "Observation".to_string();

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let root = snapshot.get_element("Observation.value[x]").unwrap();
    let slicing = root.slicing.as_ref().expect("synthesized slicing root");
    assert_eq!(
        slicing.discriminator.as_ref().unwrap()[0].discriminator_type,
        DiscriminatorType::Type
    );

    let quantity = snapshot.get_element("Observation.valueQuantity").unwrap();
    assert_eq!(quantity.types.as_ref().unwrap().len(), 1);
    assert_eq!(quantity.types.as_ref().unwrap()[0].code, "Quantity");
    let string_variant = snapshot.get_element("Observation.valueString").unwrap();
    assert_eq!(string_variant.types.as_ref().unwrap()[0].code, "string");
}

#[test]
fn datatype_expansion_inserts_rewritten_children() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());
    resolver.register(identifier_datatype());

    let mut diff = ElementDefinition::new("Patient.identifier.system");
    diff.min = Some(1);
    let p = profile(
        "http://example.org/StructureDefinition/ExpandedPatient",
        &format!("{}/Patient", FHIR_SD),
        vec![diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let system = snapshot.get_element("Patient.identifier.system").unwrap();
    assert_eq!(system.min, Some(1));
    let trace = system.base.as_ref().unwrap();
    assert_eq!(trace.path, "Identifier.system");

    // Expanded children sit between the parent and the next sibling
    let paths: Vec<&str> = snapshot.element.iter().map(|e| e.path.as_str()).collect();
    let identifier_pos = paths.iter().position(|p| *p == "Patient.identifier").unwrap();
    let system_pos = paths
        .iter()
        .position(|p| *p == "Patient.identifier.system")
        .unwrap();
    let name_pos = paths.iter().position(|p| *p == "Patient.name").unwrap();
    assert!(identifier_pos < system_pos && system_pos < name_pos);
}

#[test]
fn missing_datatype_definition_warns_base_not_found() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());
    // Identifier datatype deliberately not registered

    let p = profile(
        "http://example.org/StructureDefinition/NoDatatype",
        &format!("{}/Patient", FHIR_SD),
        vec![ElementDefinition::new("Patient.identifier.system")],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.code == SnapshotIssueCode::BaseNotFound));
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.code == SnapshotIssueCode::DifferentialNotConsumed));
}

#[test]
fn recursion_limit_records_error_without_throwing() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());
    resolver.register(identifier_datatype());
    resolver.register(period_datatype());

    let p = profile(
        "http://example.org/StructureDefinition/DeepPatient",
        &format!("{}/Patient", FHIR_SD),
        vec![ElementDefinition::new("Patient.identifier.period.start")],
    );

    let mut generator = SnapshotGenerator::with_options(
        &mut resolver,
        SnapshotGeneratorOptions {
            throw_on_error: false,
            max_depth: 1,
        },
    );
    let outcome = generator.generate(&p).expect("must not throw");
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.code == SnapshotIssueCode::RecursionLimit));
}

#[test]
fn nested_datatype_expansion_rewrites_each_level() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());
    resolver.register(identifier_datatype());
    resolver.register(period_datatype());

    let mut diff = ElementDefinition::new("Patient.identifier.period.start");
    diff.min = Some(1);
    let p = profile(
        "http://example.org/StructureDefinition/DeepPatient2",
        &format!("{}/Patient", FHIR_SD),
        vec![diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    let start = snapshot
        .get_element("Patient.identifier.period.start")
        .unwrap();
    assert_eq!(start.min, Some(1));
    assert_eq!(start.base.as_ref().unwrap().path, "Period.start");
}

#[test]
fn circular_base_chain_raises_and_leaves_snapshot_unset() {
    let mut resolver = MapResolver::new();

    let mut a = StructureDefinition::new(
        "http://example.org/StructureDefinition/A",
        "A",
        StructureDefinitionKind::Resource,
        "Patient",
    );
    a.base_definition = Some("http://example.org/StructureDefinition/B".to_string());
    let mut b = StructureDefinition::new(
        "http://example.org/StructureDefinition/B",
        "B",
        StructureDefinitionKind::Resource,
        "Patient",
    );
    b.base_definition = Some("http://example.org/StructureDefinition/A".to_string());
    resolver.register(a.clone());
    resolver.register(b);

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let err = generator.generate(&a).unwrap_err();
    assert!(matches!(err, Error::CircularDependency(_)));

    assert!(resolver
        .resolve("http://example.org/StructureDefinition/A")
        .unwrap()
        .snapshot
        .is_none());
}

#[test]
fn failed_generation_does_not_poison_later_runs() {
    let mut resolver = MapResolver::new();

    let p = profile(
        "http://example.org/StructureDefinition/Retry",
        &format!("{}/Patient", FHIR_SD),
        vec![],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let err = generator.generate(&p).unwrap_err();
    assert!(matches!(err, Error::BaseNotFound(_)));

    // Register the base and retry with the same generator instance
    resolver.register(patient_base());
    let mut generator = SnapshotGenerator::new(&mut resolver);
    assert!(generator.generate(&p).is_ok());
}

#[test]
fn missing_base_snapshot_is_generated_recursively() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    // Intermediate profile with a differential but no snapshot
    let mut mid_diff = ElementDefinition::new("Patient.gender");
    mid_diff.min = Some(1);
    let mid = profile(
        "http://example.org/StructureDefinition/Mid",
        &format!("{}/Patient", FHIR_SD),
        vec![mid_diff],
    );
    resolver.register(mid);

    let mut leaf_diff = ElementDefinition::new("Patient.birthDate");
    leaf_diff.must_support = Some(true);
    let leaf = profile(
        "http://example.org/StructureDefinition/Leaf",
        "http://example.org/StructureDefinition/Mid",
        vec![leaf_diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&leaf).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();

    // Constraint inherited through the intermediate profile
    assert_eq!(snapshot.get_element("Patient.gender").unwrap().min, Some(1));
    assert_eq!(
        snapshot.get_element("Patient.birthDate").unwrap().must_support,
        Some(true)
    );

    // The generated Mid snapshot was registered back into the resolver
    assert!(resolver
        .resolve("http://example.org/StructureDefinition/Mid")
        .unwrap()
        .has_snapshot());
}

#[test]
fn base_definitions_are_never_mutated() {
    let mut resolver = MapResolver::new();
    let base = patient_base();
    resolver.register(base.clone());

    let mut diff = ElementDefinition::new("Patient.name");
    diff.min = Some(1);
    let p = profile(
        "http://example.org/StructureDefinition/NoMutate",
        &format!("{}/Patient", FHIR_SD),
        vec![diff],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    generator.generate(&p).unwrap();

    assert_eq!(
        resolver.resolve(&format!("{}/Patient", FHIR_SD)).unwrap(),
        base
    );
}

#[test]
fn no_differential_clones_base_snapshot() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    let mut p = profile(
        "http://example.org/StructureDefinition/Verbatim",
        &format!("{}/Patient", FHIR_SD),
        vec![],
    );
    p.differential = None;

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    let snapshot = outcome.structure_definition.snapshot.unwrap();
    let base_paths: Vec<String> = patient_base()
        .snapshot
        .unwrap()
        .element
        .iter()
        .map(|e| e.path.clone())
        .collect();
    let got_paths: Vec<String> = snapshot.element.iter().map(|e| e.path.clone()).collect();
    assert_eq!(got_paths, base_paths);
}

#[test]
fn unconsumed_differential_warns_or_throws_in_strict_mode() {
    let mut resolver = MapResolver::new();
    resolver.register(patient_base());

    let p = profile(
        "http://example.org/StructureDefinition/Unknown",
        &format!("{}/Patient", FHIR_SD),
        vec![ElementDefinition::new("Patient.frobnicate")],
    );

    let mut generator = SnapshotGenerator::new(&mut resolver);
    let outcome = generator.generate(&p).unwrap();
    assert!(outcome
        .issues
        .iter()
        .any(|i| i.code == SnapshotIssueCode::DifferentialNotConsumed));

    let mut generator = SnapshotGenerator::with_options(
        &mut resolver,
        SnapshotGeneratorOptions {
            throw_on_error: true,
            max_depth: 30,
        },
    );
    let err = generator.generate(&p).unwrap_err();
    assert!(matches!(err, Error::UnconsumedDifferential(_)));
}
