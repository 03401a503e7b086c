//! The paged backend search contract.
//!
//! [`SearchBackend`] is what the chained resolver calls to run sub-queries. A
//! backend returns one [`SearchPage`] per call and an opaque continuation token
//! while more hits remain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SearchResult;
use crate::expression::{Expression, QueryFingerprint};
use crate::types::{ReferenceTarget, ResourceLocation};

/// Asks a backend to also return where matched resources point via a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceProjection {
    /// The reference parameter on the matched resources.
    pub reference_param: String,
    /// Only targets of these types are projected. Empty means any type.
    pub target_types: Vec<String>,
}

impl ReferenceProjection {
    /// Creates a projection.
    pub fn new(reference_param: impl Into<String>, target_types: Vec<String>) -> Self {
        Self {
            reference_param: reference_param.into(),
            target_types,
        }
    }

    /// Returns true if a target of this type should be projected.
    pub fn accepts_type(&self, resource_type: &str) -> bool {
        self.target_types.is_empty() || self.target_types.iter().any(|t| t == resource_type)
    }
}

/// A query handed to a [`SearchBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendQuery {
    /// Resource types to search. Empty means every type.
    pub resource_types: Vec<String>,
    /// Filter; `None` matches every resource of the requested types.
    pub filter: Option<Expression>,
    /// References to project onto each hit.
    pub projections: Vec<ReferenceProjection>,
    /// Maximum hits per page; the backend default applies when `None`.
    pub page_size: Option<usize>,
}

impl BackendQuery {
    /// Creates a query over the given resource types.
    pub fn new(resource_types: Vec<String>) -> Self {
        Self {
            resource_types,
            filter: None,
            projections: Vec::new(),
            page_size: None,
        }
    }

    /// Sets the filter.
    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds a reference projection.
    pub fn with_projection(mut self, projection: ReferenceProjection) -> Self {
        self.projections.push(projection);
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Fingerprint of the query shape.
    pub fn fingerprint(&self) -> QueryFingerprint {
        QueryFingerprint::compute(&self.resource_types, self.filter.as_ref())
            .combine(&self.projections)
    }

    /// Returns true if a resource of this type is in scope.
    pub fn includes_type(&self, resource_type: &str) -> bool {
        self.resource_types.is_empty() || self.resource_types.iter().any(|t| t == resource_type)
    }
}

/// A reference projected from a hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectedReference {
    /// The parameter the reference was found on.
    pub reference_param: String,
    /// Where it points.
    pub target: ReferenceTarget,
}

/// One matched resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched resource.
    pub location: ResourceLocation,
    /// Projections requested by the query.
    pub references: Vec<ProjectedReference>,
}

impl SearchHit {
    /// Creates a hit without projections.
    pub fn new(location: ResourceLocation) -> Self {
        Self {
            location,
            references: Vec::new(),
        }
    }

    /// Adds a projected reference.
    pub fn with_reference(mut self, reference_param: impl Into<String>, target: ReferenceTarget) -> Self {
        self.references.push(ProjectedReference {
            reference_param: reference_param.into(),
            target,
        });
        self
    }
}

/// One page of backend results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Hits in backend order.
    pub hits: Vec<SearchHit>,
    /// Token for the next page; `None` on the last page.
    pub continuation_token: Option<String>,
}

impl SearchPage {
    /// Creates a page.
    pub fn new(hits: Vec<SearchHit>, continuation_token: Option<String>) -> Self {
        Self {
            hits,
            continuation_token,
        }
    }

    /// An empty final page.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if more pages follow.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// A backend that can execute paged searches.
///
/// Implementations must observe `cancellation` and return
/// [`SearchError::Cancelled`](crate::SearchError::Cancelled) once it fires.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name for logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Runs one page of `query`, starting at `continuation_token`.
    async fn search(
        &self,
        query: &BackendQuery,
        continuation_token: Option<&str>,
        cancellation: &CancellationToken,
    ) -> SearchResult<SearchPage>;
}
