//! Engine-wide configuration.
//!
//! All sections are optional when deserializing; missing fields take their
//! defaults.
//!
//! ```
//! use helios_search_engine::config::SearchEngineConfig;
//!
//! let config = SearchEngineConfig::from_json_str(
//!     r#"{ "plan_cache": { "min_iterations_for_decision": 4 }, "chain": { "max_forward_depth": 2 } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.plan_cache.min_iterations_for_decision, 4);
//! assert_eq!(config.plan_cache.max_tracked_fingerprints, 500);
//! assert_eq!(config.chain.max_forward_depth, 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::chain::ChainConfig;
use crate::error::{SearchError, SearchResult};
use crate::plan_cache::{PlanCacheConfig, QueryPlanCachePolicy};

#[cfg(feature = "sqlite")]
use crate::backends::sqlite::SqliteBackendConfig;

/// Configuration for the search engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchEngineConfig {
    /// Adaptive plan cache selection.
    #[serde(default)]
    pub plan_cache: PlanCacheConfig,

    /// Chained search limits.
    #[serde(default)]
    pub chain: ChainConfig,

    /// SQLite backend settings.
    #[cfg(feature = "sqlite")]
    #[serde(default)]
    pub sqlite: SqliteBackendConfig,
}

impl SearchEngineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> SearchResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SearchError::invalid_configuration(e.to_string()))?;
        config
            .validate()
            .map_err(|errors| SearchError::invalid_configuration(errors.join("; ")))?;
        Ok(config)
    }

    /// Validates every section, collecting all errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(e) = self.plan_cache.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.chain.validate() {
            errors.extend(e);
        }
        #[cfg(feature = "sqlite")]
        {
            if let Err(e) = self.sqlite.validate() {
                errors.extend(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the plan cache policy for relational backends.
    pub fn plan_cache_policy(&self) -> SearchResult<QueryPlanCachePolicy> {
        QueryPlanCachePolicy::new(&self.plan_cache)
    }
}
