//! Instrumented backends and helpers for driving searches.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use helios_search_engine::backends::memory::InMemoryStore;
use helios_search_engine::core::{
    AccessAction, AccessGuard, BackendQuery, SearchBackend, SearchPage,
};
use helios_search_engine::error::{SearchError, SearchResult};

#[cfg(feature = "sqlite")]
use helios_search_engine::backends::sqlite::SqliteSearchBackend;

use super::fixtures::clinical_corpus;

/// Wraps a backend and records every search it serves.
pub struct CountingBackend<B: ?Sized> {
    inner: Arc<B>,
    calls: AtomicUsize,
    queries: Mutex<Vec<BackendQuery>>,
}

impl<B: SearchBackend + ?Sized> CountingBackend<B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Number of `search` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received, in call order.
    pub fn queries(&self) -> Vec<BackendQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl<B: SearchBackend + ?Sized> SearchBackend for CountingBackend<B> {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn search(
        &self,
        query: &BackendQuery,
        continuation_token: Option<&str>,
        cancellation: &CancellationToken,
    ) -> SearchResult<SearchPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        self.inner
            .search(query, continuation_token, cancellation)
            .await
    }
}

/// A backend whose searches never complete until cancelled.
#[derive(Debug, Default)]
pub struct StallingBackend {
    calls: AtomicUsize,
}

impl StallingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for StallingBackend {
    fn backend_name(&self) -> &'static str {
        "stalling"
    }

    async fn search(
        &self,
        _query: &BackendQuery,
        _continuation_token: Option<&str>,
        cancellation: &CancellationToken,
    ) -> SearchResult<SearchPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancellation.cancelled().await;
        Err(SearchError::Cancelled)
    }
}

/// Denies searching the listed resource types.
#[derive(Debug, Clone)]
pub struct DenySearch(pub BTreeSet<String>);

impl DenySearch {
    pub fn types(types: &[&str]) -> Self {
        Self(types.iter().map(|t| t.to_string()).collect())
    }
}

impl AccessGuard for DenySearch {
    fn is_allowed(&self, action: AccessAction, resource_type: &str) -> bool {
        !(action == AccessAction::Search && self.0.contains(resource_type))
    }
}

/// An in-memory store holding the clinical corpus.
pub fn memory_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.upsert_all(clinical_corpus());
    Arc::new(store)
}

/// An in-memory SQLite backend holding the clinical corpus.
#[cfg(feature = "sqlite")]
pub fn sqlite_backend() -> Arc<SqliteSearchBackend> {
    let backend = SqliteSearchBackend::in_memory().expect("Failed to create SQLite backend");
    let corpus = clinical_corpus();
    backend
        .index_all(corpus.iter())
        .expect("Failed to index corpus");
    Arc::new(backend)
}

/// Follows continuation tokens and returns every hit as `Type/id`.
pub async fn search_all<B: SearchBackend + ?Sized>(
    backend: &B,
    query: &BackendQuery,
) -> SearchResult<Vec<String>> {
    let cancellation = CancellationToken::new();
    let mut ids = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = backend
            .search(query, token.as_deref(), &cancellation)
            .await?;
        ids.extend(
            page.hits
                .iter()
                .map(|hit| format!("{}/{}", hit.location.resource_type, hit.location.resource_id)),
        );
        match page.continuation_token {
            Some(next) => token = Some(next),
            None => return Ok(ids),
        }
    }
}

/// Builds a query over the given types.
pub fn query(types: &[&str]) -> BackendQuery {
    BackendQuery::new(types.iter().map(|t| t.to_string()).collect())
}
