//! Compartment indexing tests.
//!
//! Membership is computed once at index time from reference entries and then
//! queried through compartment expressions.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use helios_search_engine::compartment::{CompartmentDefinitions, CompartmentIndexer};
use helios_search_engine::core::{CompartmentDefinitionLookup, IndexExtractor};
use helios_search_engine::error::ExtractionError;
use helios_search_engine::types::{
    CompartmentType, IndexedResource, ResourceLocation, SearchIndexEntry, SearchValue,
};

use common::*;

fn find<'a>(corpus: &'a [IndexedResource], resource_type: &str, id: &str) -> &'a IndexedResource {
    corpus
        .iter()
        .find(|r| r.location.resource_type == resource_type && r.location.resource_id == id)
        .expect("resource in corpus")
}

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ============================================================================
// Standard Definition Tests
// ============================================================================

#[test]
fn test_observation_memberships() {
    let corpus = clinical_corpus();
    let o1 = &find(&corpus, "Observation", "o1").compartments;

    assert_eq!(o1.get(CompartmentType::Patient), Some(&ids(&["p1"])));
    assert_eq!(o1.get(CompartmentType::Encounter), Some(&ids(&["e1"])));
    assert_eq!(o1.get(CompartmentType::Practitioner), Some(&ids(&["pr1"])));
    // Applicable but no device or related person is referenced
    assert_eq!(o1.get(CompartmentType::Device), Some(&BTreeSet::new()));
    assert_eq!(o1.get(CompartmentType::RelatedPerson), Some(&BTreeSet::new()));
}

#[test]
fn test_reference_type_must_match_compartment() {
    let corpus = clinical_corpus();

    // subject is eligible for both Patient and Device; only the typed target counts
    let o5 = &find(&corpus, "Observation", "o5").compartments;
    assert_eq!(o5.get(CompartmentType::Device), Some(&ids(&["dev1"])));
    assert_eq!(o5.get(CompartmentType::Patient), Some(&BTreeSet::new()));

    // untyped references are skipped
    let o6 = &find(&corpus, "Observation", "o6").compartments;
    assert!(!o6.contains(CompartmentType::Patient, "p2"));
    assert_eq!(o6.get(CompartmentType::Patient), Some(&BTreeSet::new()));
}

#[test]
fn test_inapplicable_compartments_are_none() {
    let corpus = clinical_corpus();

    let e1 = &find(&corpus, "Encounter", "e1").compartments;
    assert_eq!(e1.get(CompartmentType::Patient), Some(&ids(&["p1"])));
    assert_eq!(e1.get(CompartmentType::Practitioner), Some(&ids(&["pr3"])));
    assert!(e1.get(CompartmentType::Encounter).is_none());
    assert!(e1.get(CompartmentType::Device).is_none());

    let org = &find(&corpus, "Organization", "org1").compartments;
    assert_eq!(org.memberships().count(), 0);
    for compartment in CompartmentType::ALL {
        assert!(org.get(compartment).is_none());
    }
}

#[test]
fn test_multiple_eligible_params_are_merged() {
    let indexer = CompartmentIndexer::new(CompartmentDefinitions::standard());
    let entries = vec![
        SearchIndexEntry::new("subject", SearchValue::reference("Patient", "p1")),
        SearchIndexEntry::new("performer", SearchValue::reference("Patient", "p2")),
        SearchIndexEntry::new("performer", SearchValue::reference("Patient", "p1")),
        SearchIndexEntry::new("code", SearchValue::token(Some(LOINC), Some(HEART_RATE), None)),
    ];

    let indices = indexer.extract("Observation", &entries);
    assert_eq!(indices.get(CompartmentType::Patient), Some(&ids(&["p1", "p2"])));
}

// ============================================================================
// Loaded Definition Tests
// ============================================================================

#[test]
fn test_loaded_definitions_replace_standard_table() {
    let definitions = CompartmentDefinitions::load_from_json(&json!({
        "resourceType": "Bundle",
        "entry": [{
            "resource": {
                "resourceType": "CompartmentDefinition",
                "code": "Patient",
                "resource": [
                    { "code": "Observation", "param": ["performer"] },
                    { "code": "Encounter" }
                ]
            }
        }]
    }))
    .unwrap();
    let indexer = CompartmentIndexer::new(definitions);

    let o1 = index_fixture_with(&indexer, &clinical_resources()[9]);
    assert_eq!(o1.location.resource_id, "o1");
    // performer is Practitioner/pr1, so nothing lands in the Patient bucket
    assert_eq!(o1.compartments.get(CompartmentType::Patient), Some(&BTreeSet::new()));
    assert!(o1.compartments.get(CompartmentType::Encounter).is_none());

    // Encounter was listed without params
    let e1 = index_fixture_with(&indexer, &clinical_resources()[8]);
    assert!(e1.compartments.get(CompartmentType::Patient).is_none());
}

#[test]
fn test_shared_definitions_lookup() {
    let shared = Arc::new(CompartmentDefinitions::standard());
    let indexer = CompartmentIndexer::new(Arc::clone(&shared));

    assert!(
        indexer
            .definitions()
            .eligible_params("Observation", CompartmentType::Encounter)
            .is_some_and(|p| p.contains("encounter"))
    );
    let indices = indexer.extract(
        "Observation",
        &[SearchIndexEntry::new("encounter", SearchValue::reference("Encounter", "e9"))],
    );
    assert!(indices.contains(CompartmentType::Encounter, "e9"));
}

fn index_fixture_with<L: CompartmentDefinitionLookup>(
    indexer: &CompartmentIndexer<L>,
    resource: &serde_json::Value,
) -> IndexedResource {
    let location = ResourceLocation::new(
        resource["resourceType"].as_str().unwrap(),
        resource["id"].as_str().unwrap(),
    );
    indexer
        .index_resource(&FixtureExtractor, location, resource)
        .unwrap()
}

// ============================================================================
// Extraction Error Tests
// ============================================================================

#[test]
fn test_extractor_errors_propagate() {
    let indexer = CompartmentIndexer::new(CompartmentDefinitions::standard());
    let resource = json!({
        "resourceType": "Observation",
        "id": "bad",
        "search": { "value-quantity": [{ "unknown": true }] }
    });

    let err = indexer
        .index_resource(
            &FixtureExtractor,
            ResourceLocation::new("Observation", "bad"),
            &resource,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::ConversionFailed { ref param_name, .. } if param_name == "value-quantity"
    ));

    assert!(FixtureExtractor.extract(&json!({ "search": [] })).is_err());
}

// ============================================================================
// Compartment Search Tests (SQLite)
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use helios_search_engine::expression::{Expression, FieldName};

    #[tokio::test]
    async fn test_patient_compartment_search() {
        let backend = sqlite_backend();

        let observations = query(&["Observation"])
            .with_filter(Expression::compartment(CompartmentType::Patient, "p1"));
        assert_eq!(
            search_all(&*backend, &observations).await.unwrap(),
            vec!["Observation/o1", "Observation/o4"]
        );

        let everything = query(&[]).with_filter(Expression::compartment(CompartmentType::Patient, "p1"));
        assert_eq!(
            search_all(&*backend, &everything).await.unwrap(),
            vec!["Encounter/e1", "Observation/o1", "Observation/o4"]
        );
    }

    #[tokio::test]
    async fn test_practitioner_and_device_compartments() {
        let backend = sqlite_backend();

        let practitioner = query(&[]).with_filter(Expression::compartment(CompartmentType::Practitioner, "pr3"));
        assert_eq!(
            search_all(&*backend, &practitioner).await.unwrap(),
            vec!["Encounter/e1", "Observation/o2"]
        );

        let device = query(&[]).with_filter(Expression::compartment(CompartmentType::Device, "dev1"));
        assert_eq!(
            search_all(&*backend, &device).await.unwrap(),
            vec!["Observation/o5"]
        );
    }

    #[tokio::test]
    async fn test_compartment_combined_with_filter() {
        let backend = sqlite_backend();
        let filter = Expression::and(vec![
            Expression::compartment(CompartmentType::Patient, "p1"),
            Expression::search_parameter(
                "code",
                Expression::string_equals(FieldName::TokenCode, SYSTOLIC_BP, false),
            ),
        ]);

        let hits = search_all(&*backend, &query(&["Observation"]).with_filter(filter))
            .await
            .unwrap();
        assert_eq!(hits, vec!["Observation/o4"]);
    }
}
