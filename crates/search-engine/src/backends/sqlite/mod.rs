//! SQLite backend implementation.
//!
//! Resources are stored as rows of `resources`, their index entries as rows of
//! `search_index`, and their compartment memberships as rows of
//! `compartment_assignment`. Expressions compile to correlated subqueries over
//! those tables.
//!
//! # Example
//!
//! ```no_run
//! use helios_search_engine::backends::sqlite::SqliteSearchBackend;
//! use helios_search_engine::types::{IndexedResource, ResourceLocation, SearchIndexEntry, SearchValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteSearchBackend::in_memory()?;
//! backend.index_resource(&IndexedResource::new(
//!     ResourceLocation::new("Patient", "p1"),
//!     vec![SearchIndexEntry::new("name", SearchValue::string("Smith"))],
//! ))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE resources (
//!     resource_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version_id TEXT,
//!     PRIMARY KEY (resource_type, id)
//! );
//!
//! -- one row per indexed value; composites one row per component value
//! CREATE TABLE search_index (
//!     resource_type TEXT NOT NULL,
//!     resource_id TEXT NOT NULL,
//!     param_name TEXT NOT NULL,
//!     entry_index INTEGER NOT NULL,
//!     component_index INTEGER,
//!     value_string TEXT,
//!     value_token_system TEXT,
//!     value_token_code TEXT,
//!     -- ... one column per FieldName
//! );
//!
//! CREATE TABLE compartment_assignment (
//!     resource_type TEXT NOT NULL,
//!     resource_id TEXT NOT NULL,
//!     compartment_type TEXT NOT NULL,
//!     compartment_id TEXT NOT NULL
//! );
//! ```

mod backend;
mod compiler;
mod fragment;
mod planner;
mod schema;

pub use backend::{SqliteBackendConfig, SqliteSearchBackend};
pub use compiler::{SqlContext, SqlExpressionCompiler, SqlScope};
pub use fragment::{SqlFragment, SqlParam};
pub use planner::{SqlPlan, SqlSearchPlanner};
pub use schema::SCHEMA_VERSION;
