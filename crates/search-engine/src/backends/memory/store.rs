//! A [`SearchBackend`] over resources held in memory.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{BackendQuery, SearchBackend, SearchHit, SearchPage};
use crate::error::{SearchError, SearchResult};
use crate::types::{ContinuationCursor, IndexedResource, ReferenceTarget, ResourceLocation};

use super::compiler::MemoryExpressionCompiler;

/// Default number of hits per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Indexed resources kept in insertion order.
#[derive(Debug)]
pub struct InMemoryStore {
    resources: RwLock<Vec<IndexedResource>>,
    default_page_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(Vec::new()),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size used when a query does not specify one.
    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    /// Adds a resource, replacing any resource at the same type and id.
    pub fn upsert(&self, resource: IndexedResource) {
        let mut resources = self.resources.write();
        match resources
            .iter_mut()
            .find(|r| same_resource(&r.location, &resource.location))
        {
            Some(existing) => *existing = resource,
            None => resources.push(resource),
        }
    }

    /// Adds several resources.
    pub fn upsert_all(&self, resources: impl IntoIterator<Item = IndexedResource>) {
        for resource in resources {
            self.upsert(resource);
        }
    }

    /// Removes a resource. Returns true if it was present.
    pub fn remove(&self, resource_type: &str, resource_id: &str) -> bool {
        let mut resources = self.resources.write();
        let before = resources.len();
        resources.retain(|r| {
            !(r.location.resource_type == resource_type && r.location.resource_id == resource_id)
        });
        resources.len() != before
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }

    /// Runs `query` without paging and returns every matching location.
    pub fn find(&self, query: &BackendQuery) -> SearchResult<Vec<ResourceLocation>> {
        let resources = self.resources.read();
        Ok(self
            .matching(query, &resources)?
            .into_iter()
            .map(|i| resources[i].location.clone())
            .collect())
    }

    fn matching(&self, query: &BackendQuery, resources: &[IndexedResource]) -> SearchResult<Vec<usize>> {
        let positions: BTreeSet<usize> = match &query.filter {
            Some(filter) => MemoryExpressionCompiler::new()
                .compile(filter)?
                .matching_indices(resources),
            None => (0..resources.len()).collect(),
        };

        Ok(positions
            .into_iter()
            .filter(|&i| query.includes_type(&resources[i].location.resource_type))
            .collect())
    }
}

fn same_resource(a: &ResourceLocation, b: &ResourceLocation) -> bool {
    a.resource_type == b.resource_type && a.resource_id == b.resource_id
}

fn to_hit(resource: &IndexedResource, query: &BackendQuery) -> SearchHit {
    let mut hit = SearchHit::new(resource.location.clone());
    for projection in &query.projections {
        for entry in resource.entries_for(&projection.reference_param) {
            let Some(reference) = entry.value.as_reference() else {
                continue;
            };
            let Some(target_type) = reference.resource_type.as_deref() else {
                continue;
            };
            if projection.accepts_type(target_type) {
                hit = hit.with_reference(
                    projection.reference_param.clone(),
                    ReferenceTarget::new(target_type, reference.resource_id.clone()),
                );
            }
        }
    }
    hit
}

#[async_trait]
impl SearchBackend for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn search(
        &self,
        query: &BackendQuery,
        continuation_token: Option<&str>,
        cancellation: &CancellationToken,
    ) -> SearchResult<SearchPage> {
        if cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let offset = ContinuationCursor::offset_of(continuation_token)?;
        let page_size = query.page_size.unwrap_or(self.default_page_size).max(1);

        let resources = self.resources.read();
        let matched = self.matching(query, &resources)?;

        let hits: Vec<SearchHit> = matched
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|&i| to_hit(&resources[i], query))
            .collect();

        let next = offset + hits.len();
        let continuation_token =
            (next < matched.len()).then(|| ContinuationCursor::new(next).encode());

        debug!(
            resource_types = ?query.resource_types,
            offset,
            returned = hits.len(),
            total = matched.len(),
            "In-memory search page"
        );

        Ok(SearchPage::new(hits, continuation_token))
    }
}
