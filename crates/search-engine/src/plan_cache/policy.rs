//! The boolean "cache the query plan" decision.

use crate::error::SearchResult;
use crate::expression::QueryFingerprint;

use super::selector::{AdaptiveSettingSelector, PlanCacheConfig};
use super::{CACHE, NO_CACHE};

/// Decides per fingerprint whether to reuse a cached query plan.
///
/// Wraps an [`AdaptiveSettingSelector`] over the two settings `"no-cache"` and
/// `"cache"`, in that order, so warm-up starts without caching and saturated
/// selectors fall back to not caching.
#[derive(Debug)]
pub struct QueryPlanCachePolicy {
    selector: AdaptiveSettingSelector,
}

impl QueryPlanCachePolicy {
    /// Creates a policy using the numeric parameters of `config`.
    ///
    /// The settings and default of `config` are replaced by the boolean pair.
    pub fn new(config: &PlanCacheConfig) -> SearchResult<Self> {
        let config = PlanCacheConfig {
            settings: vec![NO_CACHE.to_string(), CACHE.to_string()],
            default_setting: NO_CACHE.to_string(),
            ..config.clone()
        };
        Ok(Self {
            selector: AdaptiveSettingSelector::new(config)?,
        })
    }

    /// Returns true if the next execution of `fingerprint` should use a cached plan.
    pub fn should_cache(&self, fingerprint: QueryFingerprint) -> bool {
        self.selector.recommended_setting(fingerprint) == CACHE
    }

    /// Records the latency of an execution.
    pub fn report(&self, fingerprint: QueryFingerprint, cached: bool, elapsed_ms: f64) -> SearchResult<()> {
        let setting = if cached { CACHE } else { NO_CACHE };
        self.selector
            .report_execution_time(fingerprint, setting, elapsed_ms)
    }

    /// The underlying selector.
    pub fn selector(&self) -> &AdaptiveSettingSelector {
        &self.selector
    }
}

impl Default for QueryPlanCachePolicy {
    fn default() -> Self {
        Self {
            selector: AdaptiveSettingSelector::default(),
        }
    }
}
