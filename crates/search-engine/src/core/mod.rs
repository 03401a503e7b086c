//! Contracts between the engine and its collaborators.
//!
//! - [`IndexExtractor`] - turns a resource into index entries
//! - [`CompartmentDefinitionLookup`] - compartment eligibility per resource type
//! - [`SearchBackend`] - paged, cancellable search used by chained resolution
//! - [`AccessGuard`] - externally decided authorization
//!
//! ```text
//! resource ──IndexExtractor──▶ entries ──CompartmentIndexer──▶ IndexedResource
//!                                                                   │
//! Expression ──compiler──▶ backend query ◀──SearchBackend───────────┘
//! ```

mod access;
mod compartment;
mod extractor;
mod search;

pub use access::{AccessAction, AccessGuard, AllowAll};
pub use compartment::CompartmentDefinitionLookup;
pub use extractor::IndexExtractor;
pub use search::{
    BackendQuery, ProjectedReference, ReferenceProjection, SearchBackend, SearchHit, SearchPage,
};
