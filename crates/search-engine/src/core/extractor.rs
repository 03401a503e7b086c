//! Index extraction contract.

use serde_json::Value;

use crate::error::ExtractionError;
use crate::types::SearchIndexEntry;

/// Produces the typed index entries of a resource.
///
/// Parsing and validating resources against the clinical data model is the
/// implementor's concern; the engine only consumes the resulting entries.
pub trait IndexExtractor: Send + Sync {
    /// Extracts every search index entry from `resource`.
    fn extract(&self, resource: &Value) -> Result<Vec<SearchIndexEntry>, ExtractionError>;
}
