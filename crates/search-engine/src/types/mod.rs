//! Core value types shared by every backend.
//!
//! This module contains:
//! - [`SearchValue`] and its visitor contract
//! - [`SearchIndexEntry`], [`IndexedResource`] and resource locations
//! - [`CompartmentType`] and per-resource [`CompartmentIndices`]
//! - [`Comparable`] operands and the [`ComparisonVisitor`]
//! - [`ContinuationCursor`] for offset-paged backends

mod comparison;
mod compartment;
mod cursor;
mod index_entry;
mod search_value;

pub use comparison::{Comparable, ComparisonVisitor};
pub use compartment::{CompartmentIndices, CompartmentType};
pub use cursor::ContinuationCursor;
pub use index_entry::{IndexedResource, ReferenceTarget, ResourceLocation, SearchIndexEntry};
pub use search_value::{
    CompositeSearchValue, DateTimeSearchValue, NumberSearchValue, QuantitySearchValue,
    ReferenceKind, ReferenceSearchValue, SearchValue, SearchValueVisitor, StringSearchValue,
    TokenSearchValue, UriSearchValue,
};
