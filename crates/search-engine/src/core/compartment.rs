//! Compartment definition lookup contract.

use std::collections::BTreeSet;

use crate::types::CompartmentType;

/// Answers which reference parameters place a resource type in a compartment.
pub trait CompartmentDefinitionLookup: Send + Sync {
    /// Returns the eligible parameter names, or `None` when the compartment does
    /// not apply to `resource_type` at all.
    fn eligible_params(
        &self,
        resource_type: &str,
        compartment: CompartmentType,
    ) -> Option<&BTreeSet<String>>;
}

impl<T: CompartmentDefinitionLookup + ?Sized> CompartmentDefinitionLookup for std::sync::Arc<T> {
    fn eligible_params(
        &self,
        resource_type: &str,
        compartment: CompartmentType,
    ) -> Option<&BTreeSet<String>> {
        (**self).eligible_params(resource_type, compartment)
    }
}
