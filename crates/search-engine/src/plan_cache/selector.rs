//! Per-fingerprint adaptive selection between execution settings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SearchError, SearchResult};
use crate::expression::QueryFingerprint;

use super::ewma::{Ewma, check_observation};

/// Configuration for [`AdaptiveSettingSelector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCacheConfig {
    /// Candidate settings, in tie-break order.
    #[serde(default = "default_settings")]
    pub settings: Vec<String>,

    /// EWMA smoothing factor.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Recommendations served round-robin before scores are trusted.
    #[serde(default = "default_min_iterations")]
    pub min_iterations_for_decision: u64,

    /// Maximum number of fingerprints with learning state.
    #[serde(default = "default_max_tracked")]
    pub max_tracked_fingerprints: usize,

    /// Setting returned for fingerprints beyond the capacity bound.
    #[serde(default = "default_setting")]
    pub default_setting: String,
}

fn default_settings() -> Vec<String> {
    vec![super::NO_CACHE.to_string(), super::CACHE.to_string()]
}

fn default_alpha() -> f64 {
    0.5
}

fn default_min_iterations() -> u64 {
    10
}

fn default_max_tracked() -> usize {
    500
}

fn default_setting() -> String {
    super::NO_CACHE.to_string()
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            settings: default_settings(),
            alpha: default_alpha(),
            min_iterations_for_decision: default_min_iterations(),
            max_tracked_fingerprints: default_max_tracked(),
            default_setting: default_setting(),
        }
    }
}

impl PlanCacheConfig {
    /// Creates a configuration over custom settings; the first is the default.
    pub fn with_settings<I, S>(settings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let settings: Vec<String> = settings.into_iter().map(Into::into).collect();
        let default_setting = settings.first().cloned().unwrap_or_default();
        Self {
            settings,
            default_setting,
            ..Self::default()
        }
    }

    /// Sets the warm-up length.
    pub fn with_min_iterations(mut self, min_iterations: u64) -> Self {
        self.min_iterations_for_decision = min_iterations;
        self
    }

    /// Sets the capacity bound.
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked_fingerprints = max_tracked;
        self
    }

    /// Sets the smoothing factor.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.settings.is_empty() {
            errors.push("plan cache settings must not be empty".to_string());
        }
        for (i, setting) in self.settings.iter().enumerate() {
            if self.settings[..i].contains(setting) {
                errors.push(format!("duplicate plan cache setting '{}'", setting));
            }
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            errors.push(format!("alpha must be in (0, 1], got {}", self.alpha));
        }
        if !self.settings.contains(&self.default_setting) {
            errors.push(format!(
                "default setting '{}' is not one of the settings",
                self.default_setting
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug)]
struct Tracker {
    ewma: Ewma,
    iterations: u64,
}

/// Learns, per query fingerprint, which setting runs fastest.
///
/// State lives in a concurrent map of per-fingerprint locks, so callers working
/// on different fingerprints never contend and updates to one fingerprint are
/// serialized. Construct one per process and share it by reference.
#[derive(Debug)]
pub struct AdaptiveSettingSelector {
    config: PlanCacheConfig,
    trackers: DashMap<QueryFingerprint, Arc<Mutex<Tracker>>>,
    tracked: AtomicUsize,
    saturation_logged: AtomicBool,
}

impl Default for AdaptiveSettingSelector {
    fn default() -> Self {
        Self::unchecked(PlanCacheConfig::default())
    }
}

impl AdaptiveSettingSelector {
    /// Creates a selector, rejecting invalid configurations.
    pub fn new(config: PlanCacheConfig) -> SearchResult<Self> {
        config
            .validate()
            .map_err(|errors| SearchError::invalid_configuration(errors.join("; ")))?;

        Ok(Self::unchecked(config))
    }

    fn unchecked(config: PlanCacheConfig) -> Self {
        Self {
            config,
            trackers: DashMap::new(),
            tracked: AtomicUsize::new(0),
            saturation_logged: AtomicBool::new(false),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &PlanCacheConfig {
        &self.config
    }

    /// Number of fingerprints with learning state.
    pub fn tracked_count(&self) -> usize {
        self.tracked.load(Ordering::Acquire)
    }

    /// Recommendations served so far for a tracked fingerprint.
    pub fn iterations(&self, fingerprint: QueryFingerprint) -> Option<u64> {
        let tracker = self.existing(fingerprint)?;
        Some(tracker.lock().iterations)
    }

    /// Current score of `setting` for a tracked fingerprint.
    pub fn score(&self, fingerprint: QueryFingerprint, setting: &str) -> Option<f64> {
        let tracker = self.existing(fingerprint)?;
        tracker.lock().ewma.score(setting)
    }

    /// Returns the setting to use for the next execution of `fingerprint`.
    ///
    /// The first `min_iterations_for_decision` calls cycle through the
    /// settings in order. After that the setting with the lowest score wins.
    /// Untracked fingerprints beyond the capacity bound get the default setting.
    pub fn recommended_setting(&self, fingerprint: QueryFingerprint) -> String {
        let Some(tracker) = self.tracker_for(fingerprint) else {
            return self.config.default_setting.clone();
        };

        let mut tracker = tracker.lock();
        let iteration = tracker.iterations;
        tracker.iterations += 1;

        if iteration < self.config.min_iterations_for_decision {
            let slot = (iteration % self.config.settings.len() as u64) as usize;
            return self.config.settings[slot].clone();
        }

        tracker
            .ewma
            .best()
            .map(String::from)
            .unwrap_or_else(|| self.config.default_setting.clone())
    }

    /// Records how long an execution with `setting` took.
    ///
    /// Fails for settings outside the configuration and for elapsed times that
    /// are NaN, infinite or negative. Reports for fingerprints without learning
    /// state are ignored.
    pub fn report_execution_time(
        &self,
        fingerprint: QueryFingerprint,
        setting: &str,
        elapsed_ms: f64,
    ) -> SearchResult<()> {
        if !self.config.settings.iter().any(|s| s == setting) {
            return Err(SearchError::invalid_configuration(format!(
                "unknown setting '{}'",
                setting
            )));
        }
        check_observation(elapsed_ms)?;

        match self.existing(fingerprint) {
            Some(tracker) => {
                tracker.lock().ewma.update(setting, elapsed_ms)?;
            }
            None => {
                debug!(%fingerprint, setting, "Ignoring report for untracked fingerprint");
            }
        }
        Ok(())
    }

    fn existing(&self, fingerprint: QueryFingerprint) -> Option<Arc<Mutex<Tracker>>> {
        self.trackers.get(&fingerprint).map(|t| Arc::clone(t.value()))
    }

    fn tracker_for(&self, fingerprint: QueryFingerprint) -> Option<Arc<Mutex<Tracker>>> {
        if let Some(tracker) = self.existing(fingerprint) {
            return Some(tracker);
        }

        match self.trackers.entry(fingerprint) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let max = self.config.max_tracked_fingerprints;
                let reserved = self
                    .tracked
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .is_ok();

                if !reserved {
                    if !self.saturation_logged.swap(true, Ordering::Relaxed) {
                        warn!(
                            max_tracked = max,
                            "Plan cache selector is full; new fingerprints get the default setting"
                        );
                    }
                    return None;
                }

                let tracker = Arc::new(Mutex::new(Tracker {
                    ewma: Ewma::new(self.config.settings.iter().cloned(), self.config.alpha),
                    iterations: 0,
                }));
                entry.insert(Arc::clone(&tracker));
                Some(tracker)
            }
        }
    }
}
