//! Index entries and the resources they belong to.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::compartment::CompartmentIndices;
use super::search_value::SearchValue;

/// A `(parameter name, typed value)` pair extracted from a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexEntry {
    /// The search parameter code (e.g., "name", "subject").
    pub parameter_name: String,
    /// The extracted value.
    pub value: SearchValue,
}

impl SearchIndexEntry {
    /// Creates a new index entry.
    pub fn new(parameter_name: impl Into<String>, value: SearchValue) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            value,
        }
    }
}

/// Identifies a stored resource version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLocation {
    /// The resource type.
    pub resource_type: String,
    /// The logical id.
    pub resource_id: String,
    /// The version id, when the location pins one.
    pub version_id: Option<String>,
}

impl ResourceLocation {
    /// Creates an unversioned location.
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version_id: None,
        }
    }

    /// Pins the location to a version.
    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "{}/{}/_history/{}", self.resource_type, self.resource_id, v),
            None => write!(f, "{}/{}", self.resource_type, self.resource_id),
        }
    }
}

/// A resource location together with its index entries and compartments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedResource {
    /// Where the resource lives.
    pub location: ResourceLocation,
    /// Index entries produced by the extractor.
    pub entries: Vec<SearchIndexEntry>,
    /// Compartment membership derived from the entries.
    #[serde(default)]
    pub compartments: CompartmentIndices,
}

impl IndexedResource {
    /// Creates an indexed resource without compartment membership.
    pub fn new(location: ResourceLocation, entries: Vec<SearchIndexEntry>) -> Self {
        Self {
            location,
            entries,
            compartments: CompartmentIndices::default(),
        }
    }

    /// Attaches compartment membership.
    pub fn with_compartments(mut self, compartments: CompartmentIndices) -> Self {
        self.compartments = compartments;
        self
    }

    /// Returns the entries for one parameter.
    pub fn entries_for<'a>(
        &'a self,
        parameter_name: &'a str,
    ) -> impl Iterator<Item = &'a SearchIndexEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.parameter_name == parameter_name)
    }
}

/// A `(resource type, resource id)` pair pointed at by a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTarget {
    /// Target resource type.
    pub resource_type: String,
    /// Target resource id.
    pub resource_id: String,
}

impl ReferenceTarget {
    /// Creates a reference target.
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}
