//! Adaptive query-plan cache selection.
//!
//! Each distinct query shape ([`QueryFingerprint`](crate::expression::QueryFingerprint))
//! gets its own latency tracker. The selector first tries every setting in
//! turn, then keeps recommending whichever has the lowest smoothed latency
//! while continuing to learn from reported timings.
//!
//! ```
//! use helios_search_engine::expression::QueryFingerprint;
//! use helios_search_engine::plan_cache::{AdaptiveSettingSelector, PlanCacheConfig};
//!
//! let selector = AdaptiveSettingSelector::new(
//!     PlanCacheConfig::with_settings(["no-cache", "cache"]).with_min_iterations(2),
//! )
//! .unwrap();
//!
//! let fp = QueryFingerprint(42);
//! let setting = selector.recommended_setting(fp);
//! selector.report_execution_time(fp, &setting, 12.5).unwrap();
//! ```

mod ewma;
mod policy;
mod selector;

pub use ewma::Ewma;
pub use policy::QueryPlanCachePolicy;
pub use selector::{AdaptiveSettingSelector, PlanCacheConfig};

/// Setting name for executing without a cached plan.
pub const NO_CACHE: &str = "no-cache";

/// Setting name for executing with a cached plan.
pub const CACHE: &str = "cache";
