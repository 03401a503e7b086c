//! Backend compilers and stores.
//!
//! Each backend lowers the expression IR through its own
//! [`ExpressionVisitor`](crate::expression::ExpressionVisitor) implementation.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | Reference semantics over in-memory index entries |
//! | SQLite | `sqlite` | Relational SQL with correlated subqueries and plan caching |
//! | Document | always | Elasticsearch-style bool/nested JSON queries |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use helios_search_engine::backends::sqlite::SqliteSearchBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite backend
//! let backend = SqliteSearchBackend::in_memory()?;
//!
//! // Or use a file-based database
//! let backend = SqliteSearchBackend::open("./data/search.db")?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
