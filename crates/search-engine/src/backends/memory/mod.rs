//! In-memory reference backend.
//!
//! [`MemoryExpressionCompiler`] defines the reference semantics of the core
//! expression nodes; [`InMemoryStore`] serves paged searches with it.

mod compiler;
mod store;

pub use compiler::{MemoryContext, MemoryExpressionCompiler, Predicate};
pub use store::{DEFAULT_PAGE_SIZE, InMemoryStore};
