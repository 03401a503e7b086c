//! Lazy, restartable paging over a backend query.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::core::{BackendQuery, SearchBackend, SearchPage};
use crate::error::{SearchError, SearchResult};

/// Pages through one backend query, one fetch per [`next_page`](Self::next_page).
///
/// The cancellation token is checked before every fetch and passed to the
/// backend. A cancelled fetch leaves the pager where it was, so
/// [`restart`](Self::restart) or a retry with a fresh token resumes cleanly.
pub struct ChainedPages<B: ?Sized> {
    backend: Arc<B>,
    query: BackendQuery,
    cancellation: CancellationToken,
    continuation: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<B: SearchBackend + ?Sized> ChainedPages<B> {
    /// Creates a pager positioned before the first page.
    pub fn new(backend: Arc<B>, query: BackendQuery, cancellation: CancellationToken) -> Self {
        Self {
            backend,
            query,
            cancellation,
            continuation: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// The query being paged.
    pub fn query(&self) -> &BackendQuery {
        &self.query
    }

    /// Number of backend calls made so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Returns true once the last page has been returned.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next page; `None` after the last one.
    pub async fn next_page(&mut self) -> SearchResult<Option<SearchPage>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let page = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(SearchError::Cancelled),
            page = self.backend.search(
                &self.query,
                self.continuation.as_deref(),
                &self.cancellation,
            ) => page?,
        };

        self.pages_fetched += 1;
        self.continuation = page.continuation_token.clone();
        self.exhausted = self.continuation.is_none();

        trace!(
            backend = self.backend.backend_name(),
            page = self.pages_fetched,
            hits = page.hits.len(),
            more = !self.exhausted,
            "Fetched chained sub-query page"
        );

        Ok(Some(page))
    }

    /// Rewinds to before the first page.
    pub fn restart(&mut self) {
        self.continuation = None;
        self.exhausted = false;
    }
}
