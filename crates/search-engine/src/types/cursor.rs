//! Opaque continuation tokens for offset-paged backends.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Position of the next page in an offset-paged result set.
///
/// Encoded as base64 JSON so callers treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationCursor {
    /// Cursor format version.
    version: u8,

    /// Number of hits already returned.
    offset: usize,
}

impl ContinuationCursor {
    /// Creates a cursor at the given offset.
    pub fn new(offset: usize) -> Self {
        Self { version: 1, offset }
    }

    /// Returns the offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, SearchError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| SearchError::InvalidContinuationToken {
                token: s.to_string(),
            })?;

        serde_json::from_slice(&bytes).map_err(|_| SearchError::InvalidContinuationToken {
            token: s.to_string(),
        })
    }

    /// Decodes an optional token; `None` starts at offset zero.
    pub fn offset_of(token: Option<&str>) -> Result<usize, SearchError> {
        token.map_or(Ok(0), |t| Self::decode(t).map(|c| c.offset))
    }
}
