//! Compartment membership.
//!
//! [`CompartmentIndexer`] computes, at index time, which Patient, Encounter,
//! RelatedPerson, Practitioner and Device compartments a resource belongs to.
//! [`CompartmentDefinitions`] supplies the eligible reference parameters.

mod definitions;
mod indexer;

pub use definitions::CompartmentDefinitions;
pub use indexer::CompartmentIndexer;
