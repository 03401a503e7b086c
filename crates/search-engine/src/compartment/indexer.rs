//! Derives compartment membership from index entries.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::trace;

use crate::core::{CompartmentDefinitionLookup, IndexExtractor};
use crate::error::ExtractionError;
use crate::types::{
    CompartmentIndices, CompartmentType, IndexedResource, ResourceLocation, SearchIndexEntry,
    SearchValue,
};

/// Computes [`CompartmentIndices`] for resources at index time.
///
/// Pure and synchronous; one indexer can serve any number of threads.
#[derive(Debug, Clone)]
pub struct CompartmentIndexer<L> {
    definitions: L,
}

impl<L: CompartmentDefinitionLookup> CompartmentIndexer<L> {
    /// Creates an indexer over a definition lookup.
    pub fn new(definitions: L) -> Self {
        Self { definitions }
    }

    /// Returns the definition lookup.
    pub fn definitions(&self) -> &L {
        &self.definitions
    }

    /// Computes the compartment buckets of one resource.
    ///
    /// A bucket is `None` when the compartment does not apply to
    /// `resource_type`. Otherwise it holds the ids of every reference entry on
    /// an eligible parameter whose explicit target type is the compartment's
    /// resource type. Untyped references are skipped.
    pub fn extract(&self, resource_type: &str, entries: &[SearchIndexEntry]) -> CompartmentIndices {
        let mut indices = CompartmentIndices::default();

        for compartment in CompartmentType::ALL {
            let Some(params) = self.definitions.eligible_params(resource_type, compartment) else {
                continue;
            };
            indices.set(compartment, Some(collect_ids(compartment, params, entries)));
        }

        indices
    }

    /// Extracts entries with `extractor` and attaches compartment membership.
    pub fn index_resource(
        &self,
        extractor: &dyn IndexExtractor,
        location: ResourceLocation,
        resource: &Value,
    ) -> Result<IndexedResource, ExtractionError> {
        let entries = extractor.extract(resource)?;
        let compartments = self.extract(&location.resource_type, &entries);
        Ok(IndexedResource::new(location, entries).with_compartments(compartments))
    }
}

fn collect_ids(
    compartment: CompartmentType,
    params: &BTreeSet<String>,
    entries: &[SearchIndexEntry],
) -> BTreeSet<String> {
    let expected_type = compartment.resource_type();

    entries
        .iter()
        .filter(|entry| params.contains(&entry.parameter_name))
        .filter_map(|entry| match &entry.value {
            SearchValue::Reference(reference) => Some((entry, reference)),
            _ => None,
        })
        .filter_map(|(entry, reference)| match reference.resource_type.as_deref() {
            Some(target) if target == expected_type => Some(reference.resource_id.clone()),
            target => {
                trace!(
                    param = %entry.parameter_name,
                    target = ?target,
                    compartment = %compartment,
                    "Skipping reference outside compartment"
                );
                None
            }
        })
        .collect()
}
