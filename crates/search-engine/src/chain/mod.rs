//! Chained and reverse-chained search resolution.
//!
//! Backends without joins cannot evaluate [`Expression::Chained`](crate::expression::Expression::Chained)
//! directly. [`ChainedExpressionResolver`] runs each hop as a paged
//! [`SearchBackend`](crate::core::SearchBackend) sub-query and folds the hits
//! back into ordinary filters, innermost hop first.

mod pager;
mod resolver;

use serde::{Deserialize, Serialize};

pub use pager::ChainedPages;
pub use resolver::ChainedExpressionResolver;

/// Limits for chained resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Maximum forward hops along any path.
    #[serde(default = "default_max_depth")]
    pub max_forward_depth: usize,

    /// Maximum reverse (`_has`) hops along any path.
    #[serde(default = "default_max_depth")]
    pub max_reverse_depth: usize,

    /// Maximum distinct resources a single hop may fold back.
    #[serde(default = "default_max_subquery_results")]
    pub max_subquery_results: usize,

    /// Page size requested from the backend.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_max_depth() -> usize {
    4
}

fn default_max_subquery_results() -> usize {
    1000
}

fn default_page_size() -> usize {
    100
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_forward_depth: default_max_depth(),
            max_reverse_depth: default_max_depth(),
            max_subquery_results: default_max_subquery_results(),
            page_size: default_page_size(),
        }
    }
}

impl ChainConfig {
    /// Creates a configuration with the given depth limits.
    pub fn new(max_forward_depth: usize, max_reverse_depth: usize) -> Self {
        Self {
            max_forward_depth,
            max_reverse_depth,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.page_size == 0 {
            errors.push("chain page_size must be positive".to_string());
        }
        if self.max_subquery_results == 0 {
            errors.push("chain max_subquery_results must be positive".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
