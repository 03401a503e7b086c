//! Compartment definition tables.
//!
//! Maps `(compartment, resource type)` to the reference parameters that place a
//! resource of that type in the compartment. Tables come from the built-in
//! [`CompartmentDefinitions::standard`] set, from FHIR `CompartmentDefinition`
//! resources, or are assembled by hand.
//!
//! See: https://hl7.org/fhir/compartmentdefinition.html

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::core::CompartmentDefinitionLookup;
use crate::error::ExtractionError;
use crate::types::CompartmentType;

/// Common membership parameters, after the published compartment definitions.
const STANDARD: &[(CompartmentType, &str, &[&str])] = &[
    // Patient compartment
    (CompartmentType::Patient, "Observation", &["subject", "performer"]),
    (CompartmentType::Patient, "Condition", &["subject", "asserter"]),
    (CompartmentType::Patient, "Procedure", &["subject", "performer"]),
    (CompartmentType::Patient, "Encounter", &["subject"]),
    (CompartmentType::Patient, "DiagnosticReport", &["subject"]),
    (CompartmentType::Patient, "MedicationRequest", &["subject"]),
    (CompartmentType::Patient, "MedicationStatement", &["subject"]),
    (CompartmentType::Patient, "Immunization", &["patient"]),
    (CompartmentType::Patient, "AllergyIntolerance", &["patient", "recorder", "asserter"]),
    (CompartmentType::Patient, "CarePlan", &["subject", "performer"]),
    (CompartmentType::Patient, "CareTeam", &["subject", "participant"]),
    (CompartmentType::Patient, "Claim", &["patient", "payee"]),
    (CompartmentType::Patient, "Coverage", &["beneficiary", "policy-holder", "subscriber", "payor"]),
    (CompartmentType::Patient, "DocumentReference", &["subject", "author"]),
    (CompartmentType::Patient, "Goal", &["subject"]),
    (CompartmentType::Patient, "ServiceRequest", &["subject", "performer"]),
    (CompartmentType::Patient, "Appointment", &["actor"]),
    (CompartmentType::Patient, "Communication", &["subject", "sender", "recipient"]),
    (CompartmentType::Patient, "Consent", &["patient"]),
    (CompartmentType::Patient, "Device", &["patient"]),
    (CompartmentType::Patient, "FamilyMemberHistory", &["patient"]),
    (CompartmentType::Patient, "Flag", &["subject"]),
    (CompartmentType::Patient, "ImagingStudy", &["subject"]),
    (CompartmentType::Patient, "List", &["subject", "source"]),
    (CompartmentType::Patient, "NutritionOrder", &["patient"]),
    (CompartmentType::Patient, "QuestionnaireResponse", &["subject", "author"]),
    (CompartmentType::Patient, "RelatedPerson", &["patient"]),
    (CompartmentType::Patient, "RiskAssessment", &["subject"]),
    (CompartmentType::Patient, "Specimen", &["subject"]),
    // Encounter compartment
    (CompartmentType::Encounter, "Observation", &["encounter"]),
    (CompartmentType::Encounter, "Condition", &["encounter"]),
    (CompartmentType::Encounter, "Procedure", &["encounter"]),
    (CompartmentType::Encounter, "DiagnosticReport", &["encounter"]),
    (CompartmentType::Encounter, "MedicationRequest", &["encounter"]),
    (CompartmentType::Encounter, "DocumentReference", &["encounter"]),
    (CompartmentType::Encounter, "Communication", &["encounter"]),
    (CompartmentType::Encounter, "Composition", &["encounter"]),
    // Practitioner compartment
    (CompartmentType::Practitioner, "Appointment", &["actor"]),
    (CompartmentType::Practitioner, "Encounter", &["practitioner", "participant"]),
    (CompartmentType::Practitioner, "Observation", &["performer"]),
    (CompartmentType::Practitioner, "Procedure", &["performer"]),
    (CompartmentType::Practitioner, "DiagnosticReport", &["performer"]),
    (CompartmentType::Practitioner, "MedicationRequest", &["requester"]),
    (CompartmentType::Practitioner, "CarePlan", &["performer"]),
    (CompartmentType::Practitioner, "CareTeam", &["participant"]),
    (CompartmentType::Practitioner, "Communication", &["sender", "recipient"]),
    (CompartmentType::Practitioner, "AllergyIntolerance", &["recorder", "asserter"]),
    (CompartmentType::Practitioner, "Condition", &["asserter"]),
    // RelatedPerson compartment
    (CompartmentType::RelatedPerson, "Observation", &["performer"]),
    (CompartmentType::RelatedPerson, "Procedure", &["performer"]),
    (CompartmentType::RelatedPerson, "Appointment", &["actor"]),
    (CompartmentType::RelatedPerson, "Encounter", &["participant"]),
    (CompartmentType::RelatedPerson, "AllergyIntolerance", &["asserter"]),
    // Device compartment
    (CompartmentType::Device, "Observation", &["subject", "device"]),
    (CompartmentType::Device, "Procedure", &["performer"]),
    (CompartmentType::Device, "DiagnosticReport", &["subject"]),
    (CompartmentType::Device, "Communication", &["sender", "recipient"]),
];

/// A `(compartment, resource type) -> parameters` table.
#[derive(Debug, Clone, Default)]
pub struct CompartmentDefinitions {
    table: HashMap<(CompartmentType, String), BTreeSet<String>>,
}

impl CompartmentDefinitions {
    /// Creates an empty table; no compartment applies to any type.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table of common clinical resource types.
    pub fn standard() -> Self {
        STANDARD
            .iter()
            .fold(Self::new(), |defs, (compartment, resource_type, params)| {
                defs.with(*compartment, *resource_type, params.iter().copied())
            })
    }

    /// Adds parameters for a `(compartment, resource type)` pair.
    ///
    /// Adding an empty parameter list still marks the compartment as applicable.
    pub fn with<I, S>(mut self, compartment: CompartmentType, resource_type: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(compartment, resource_type, params);
        self
    }

    fn insert<I, S>(&mut self, compartment: CompartmentType, resource_type: &str, params: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .entry((compartment, resource_type.to_string()))
            .or_default()
            .extend(params.into_iter().map(Into::into));
    }

    /// Number of `(compartment, resource type)` pairs.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no pair is defined.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Loads definitions from JSON.
    ///
    /// Accepts a single `CompartmentDefinition` resource, an array of them, or a
    /// `Bundle` whose entries contain them. Entries of other resource types are
    /// ignored, as are definitions for compartments outside [`CompartmentType`].
    pub fn load_from_json(json: &Value) -> Result<Self, ExtractionError> {
        let mut defs = Self::new();
        defs.merge_json(json)?;
        Ok(defs)
    }

    /// Merges definitions from JSON into this table.
    pub fn merge_json(&mut self, json: &Value) -> Result<(), ExtractionError> {
        match json {
            Value::Array(items) => {
                for item in items {
                    self.merge_json(item)?;
                }
                Ok(())
            }
            Value::Object(obj) => match obj.get("resourceType").and_then(Value::as_str) {
                Some("Bundle") => {
                    let entries = obj.get("entry").and_then(Value::as_array);
                    for resource in entries.into_iter().flatten().filter_map(|e| e.get("resource")) {
                        self.merge_json(resource)?;
                    }
                    Ok(())
                }
                Some("CompartmentDefinition") => self.merge_definition(json),
                Some(other) => {
                    debug!(resource_type = other, "Skipping non-CompartmentDefinition resource");
                    Ok(())
                }
                None => Err(ExtractionError::InvalidResource {
                    message: "missing resourceType".to_string(),
                }),
            },
            _ => Err(ExtractionError::InvalidResource {
                message: "expected a JSON object or array".to_string(),
            }),
        }
    }

    fn merge_definition(&mut self, definition: &Value) -> Result<(), ExtractionError> {
        let code = definition
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractionError::InvalidResource {
                message: "CompartmentDefinition without code".to_string(),
            })?;

        let Ok(compartment) = code.parse::<CompartmentType>() else {
            debug!(code, "Skipping unsupported compartment");
            return Ok(());
        };

        let resources = definition.get("resource").and_then(Value::as_array);
        for resource in resources.into_iter().flatten() {
            let Some(resource_type) = resource.get("code").and_then(Value::as_str) else {
                continue;
            };
            // Types listed without params are not members of the compartment.
            let Some(params) = resource.get("param").and_then(Value::as_array) else {
                continue;
            };
            let params: Vec<&str> = params
                .iter()
                .filter_map(Value::as_str)
                .filter(|p| !p.starts_with('{'))
                .collect();
            if !params.is_empty() {
                self.insert(compartment, resource_type, params);
            }
        }
        Ok(())
    }
}

impl CompartmentDefinitionLookup for CompartmentDefinitions {
    fn eligible_params(
        &self,
        resource_type: &str,
        compartment: CompartmentType,
    ) -> Option<&BTreeSet<String>> {
        self.table.get(&(compartment, resource_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(defs: &CompartmentDefinitions, rt: &str, c: CompartmentType) -> Option<Vec<String>> {
        defs.eligible_params(rt, c)
            .map(|p| p.iter().cloned().collect())
    }

    #[test]
    fn test_standard_table() {
        let defs = CompartmentDefinitions::standard();
        assert_eq!(
            params(&defs, "Observation", CompartmentType::Patient),
            Some(vec!["performer".to_string(), "subject".to_string()])
        );
        assert_eq!(
            params(&defs, "Observation", CompartmentType::Encounter),
            Some(vec!["encounter".to_string()])
        );
        assert!(params(&defs, "Organization", CompartmentType::Patient).is_none());
        assert!(params(&defs, "Immunization", CompartmentType::Device).is_none());
    }

    #[test]
    fn test_load_compartment_definition() {
        let definition = json!({
            "resourceType": "CompartmentDefinition",
            "code": "Patient",
            "resource": [
                {"code": "Observation", "param": ["subject", "performer"]},
                {"code": "Patient", "param": ["link", "{def}"]},
                {"code": "Organization"}
            ]
        });
        let defs = CompartmentDefinitions::load_from_json(&definition).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            params(&defs, "Patient", CompartmentType::Patient),
            Some(vec!["link".to_string()])
        );
        assert!(params(&defs, "Organization", CompartmentType::Patient).is_none());
    }

    #[test]
    fn test_load_bundle_and_array() {
        let device = json!({
            "resourceType": "CompartmentDefinition",
            "code": "Device",
            "resource": [{"code": "Observation", "param": ["device"]}]
        });
        let other = json!({"resourceType": "Patient", "id": "p1"});
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [{"resource": device}, {"resource": other}]
        });

        let defs = CompartmentDefinitions::load_from_json(&json!([bundle])).unwrap();
        assert_eq!(
            params(&defs, "Observation", CompartmentType::Device),
            Some(vec!["device".to_string()])
        );
    }

    #[test]
    fn test_load_rejects_invalid_input() {
        assert!(CompartmentDefinitions::load_from_json(&json!("text")).is_err());
        assert!(CompartmentDefinitions::load_from_json(&json!({"code": "Patient"})).is_err());
        assert!(
            CompartmentDefinitions::load_from_json(&json!({"resourceType": "CompartmentDefinition"}))
                .is_err()
        );
    }

    #[test]
    fn test_unknown_compartment_ignored() {
        let defs = CompartmentDefinitions::load_from_json(&json!({
            "resourceType": "CompartmentDefinition",
            "code": "EpisodeOfCare",
            "resource": [{"code": "Observation", "param": ["subject"]}]
        }))
        .unwrap();
        assert!(defs.is_empty());
    }
}
