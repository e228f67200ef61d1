//! Compartment assignment
//!
//! A Patient belongs to its own compartment; clinical resources belong to
//! the compartment of the patient they reference via `subject` or
//! `patient`.

use serde_json::Value;
use uuid::Uuid;

fn patient_reference_id(value: &Value) -> Option<Uuid> {
    let reference = value.get("reference")?.as_str()?;
    let rest = reference.strip_prefix("Patient/")?;
    Uuid::parse_str(rest).ok()
}

/// Compartment ids for a resource.
pub fn compute_compartments(resource_type: &str, id: Uuid, content: &Value) -> Vec<Uuid> {
    if resource_type == "Patient" {
        return vec![id];
    }
    let mut out = Vec::new();
    for field in ["subject", "patient"] {
        if let Some(reference) = content.get(field) {
            if let Some(patient_id) = patient_reference_id(reference) {
                if !out.contains(&patient_id) {
                    out.push(patient_id);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patient_is_in_its_own_compartment() {
        let id = Uuid::new_v4();
        let compartments = compute_compartments("Patient", id, &json!({"resourceType": "Patient"}));
        assert_eq!(compartments, vec![id]);
    }

    #[test]
    fn clinical_resources_follow_their_subject() {
        let patient_id = Uuid::new_v4();
        let content = json!({
            "resourceType": "Observation",
            "subject": {"reference": format!("Patient/{}", patient_id)}
        });
        let compartments = compute_compartments("Observation", Uuid::new_v4(), &content);
        assert_eq!(compartments, vec![patient_id]);
    }

    #[test]
    fn non_patient_references_are_ignored() {
        let content = json!({
            "resourceType": "Observation",
            "subject": {"reference": "Device/123"}
        });
        assert!(compute_compartments("Observation", Uuid::new_v4(), &content).is_empty());
    }
}
