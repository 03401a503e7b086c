//! Error types for the search engine.
//!
//! Errors are grouped by how a caller is expected to react to them:
//!
//! - [`SearchError::UnsupportedOperation`] - the backend compiler does not implement a
//!   node kind. Always fatal for that compile attempt and never retried.
//! - [`SearchError::InvalidConfiguration`] - a programmer error such as reporting a
//!   latency for a setting the selector does not know.
//! - [`SearchError::Backend`] - failures from a backend search call. The engine does
//!   not retry; the caller owns retry policy (see [`SearchError::is_transient`]).

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::expression::ExpressionKind;

/// The primary error type for compiling and executing search expressions.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The backend compiler has no semantics for this node kind.
    #[error("{backend} backend does not support {node} expressions")]
    UnsupportedOperation {
        backend: &'static str,
        node: ExpressionKind,
    },

    /// The engine was used in a way its configuration does not allow.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Chained search resolution errors
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The operation was cancelled through its cancellation token.
    #[error("search operation was cancelled")]
    Cancelled,

    /// A continuation token could not be decoded.
    #[error("invalid continuation token: {token}")]
    InvalidContinuationToken { token: String },
}

impl SearchError {
    /// Creates an unsupported-operation error for a node kind.
    pub fn unsupported(backend: &'static str, node: ExpressionKind) -> Self {
        SearchError::UnsupportedOperation { backend, node }
    }

    /// Creates an invalid-configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        SearchError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call could succeed.
    ///
    /// Only backend availability problems qualify. Compile errors and
    /// configuration errors are deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::Backend(
                BackendError::Unavailable { .. }
                    | BackendError::ConnectionFailed { .. }
                    | BackendError::PoolExhausted { .. }
                    | BackendError::Timeout { .. }
            )
        )
    }
}

/// Errors raised while resolving chained and reverse-chained expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Chain exceeds maximum allowed depth.
    #[error("{direction} chain depth {depth} exceeds maximum allowed depth {max}")]
    MaxDepthExceeded {
        direction: &'static str,
        depth: usize,
        max: usize,
    },

    /// A sub-query matched more resources than the resolver will fold back.
    #[error("chained sub-query for {resource_types} exceeded the limit of {limit} results")]
    SubqueryLimitExceeded { resource_types: String, limit: usize },

    /// A chained expression named no target resource types.
    #[error("chained parameter '{reference_param}' has no target resource types")]
    NoTargetTypes { reference_param: String },
}

/// Errors originating from the storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// The backend did not answer in time.
    #[error("{backend_name} timed out after {timeout_ms}ms")]
    Timeout { backend_name: String, timeout_ms: u64 },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors produced by an external index extractor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Resource is not a valid JSON object.
    #[error("invalid resource: {message}")]
    InvalidResource { message: String },

    /// A value could not be converted into a search value.
    #[error("cannot convert '{actual_value}' to {expected_type} for parameter '{param_name}'")]
    ConversionFailed {
        param_name: String,
        expected_type: String,
        actual_value: String,
    },
}

/// Result type alias for search engine operations.
pub type SearchResult<T> = Result<T, SearchError>;

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for SearchError {
    fn from(_err: r2d2::Error) -> Self {
        SearchError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}
