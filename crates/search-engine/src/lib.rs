//! Helios FHIR Server Search Engine
//!
//! This crate compiles backend-agnostic FHIR search expressions and executes
//! them against pluggable stores. Searches are described once as an
//! [`Expression`](expression::Expression) tree and lowered by each backend's
//! visitor.
//!
//! # Features
//!
//! - **Expression IR**: search parameters, comparisons, string matching, logical
//!   operators, chains, compartments, includes, sorts
//! - **Compartments**: index-time Patient/Encounter/RelatedPerson/Practitioner/Device membership
//! - **Chained search**: forward and reverse chains resolved through cancellable
//!   paged sub-queries
//! - **Adaptive plan caching**: per-query-shape EWMA latency tracking decides
//!   whether to reuse prepared statements
//! - **Backends**: in-memory reference semantics, SQLite, Elasticsearch-style documents
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`types`] - search values, index entries, compartments, comparison
//! - [`expression`] - the expression IR, its visitor and fingerprints
//! - [`core`] - traits at the engine boundary
//! - [`compartment`] - compartment definitions and the indexer
//! - [`backends`] - expression compilers and stores
//! - [`chain`] - chained expression resolution
//! - [`plan_cache`] - adaptive setting selection
//! - [`config`] - engine configuration
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use helios_search_engine::backends::memory::InMemoryStore;
//! use helios_search_engine::core::{BackendQuery, SearchBackend};
//! use helios_search_engine::expression::{Expression, FieldName};
//! use helios_search_engine::types::{IndexedResource, ResourceLocation, SearchIndexEntry, SearchValue};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! store.upsert(IndexedResource::new(
//!     ResourceLocation::new("Patient", "p1"),
//!     vec![SearchIndexEntry::new("name", SearchValue::string("Smith"))],
//! ));
//!
//! let query = BackendQuery::new(vec!["Patient".to_string()]).with_filter(
//!     Expression::search_parameter("name", Expression::starts_with(FieldName::String, "smi", true)),
//! );
//! let page = store.search(&query, None, &CancellationToken::new()).await?;
//! assert_eq!(page.hits[0].location.resource_id, "p1");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod chain;
pub mod compartment;
pub mod config;
pub mod core;
pub mod error;
pub mod expression;
pub mod plan_cache;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{BackendError, ChainError, SearchError, SearchResult};
pub use expression::{Expression, ExpressionVisitor, QueryFingerprint};
pub use types::{IndexedResource, SearchIndexEntry, SearchValue};

// Re-export core traits
pub use crate::core::{AccessGuard, CompartmentDefinitionLookup, IndexExtractor, SearchBackend};

pub use chain::{ChainConfig, ChainedExpressionResolver};
pub use config::SearchEngineConfig;
pub use plan_cache::{AdaptiveSettingSelector, PlanCacheConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
