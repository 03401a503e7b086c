//! Test infrastructure for the search engine.
//!
//! This module provides a small clinical corpus, a JSON index extractor for it,
//! and instrumented backends for observing chained resolution.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
