//! Exponentially weighted moving averages over named settings.

use crate::error::{SearchError, SearchResult};

/// One optional running score per setting name.
///
/// A score is `None` until its first observation, which is taken as-is.
/// Later observations move it to `alpha * x + (1 - alpha) * score`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ewma {
    alpha: f64,
    scores: Vec<(String, Option<f64>)>,
}

impl Ewma {
    /// Creates a tracker for `names`, in order.
    pub fn new<I, S>(names: I, alpha: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            alpha,
            scores: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// The smoothing factor.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Folds an observation into `name`'s score and returns the new score.
    ///
    /// Observations must be finite and non-negative.
    pub fn update(&mut self, name: &str, value: f64) -> SearchResult<f64> {
        check_observation(value)?;
        let alpha = self.alpha;
        let score = self
            .scores
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, score)| score)
            .ok_or_else(|| {
                SearchError::invalid_configuration(format!("unknown setting '{}'", name))
            })?;

        let updated = match *score {
            None => value,
            Some(old) => alpha * value + (1.0 - alpha) * old,
        };
        *score = Some(updated);
        Ok(updated)
    }

    /// The current score of `name`; `None` if unknown or not yet observed.
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, score)| *score)
    }

    /// Names with their scores, in order.
    pub fn scores(&self) -> impl Iterator<Item = (&str, Option<f64>)> + '_ {
        self.scores.iter().map(|(n, s)| (n.as_str(), *s))
    }

    /// The name with the lowest score.
    ///
    /// Unobserved names rank after every observed one and ties go to the
    /// earlier name. Returns `None` only when there are no names.
    pub fn best(&self) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (name, score) in self.scores() {
            let score = score.unwrap_or(f64::INFINITY);
            match best {
                Some((_, current)) if score >= current => {}
                _ => best = Some((name, score)),
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Rejects NaN, infinite and negative observations.
pub(crate) fn check_observation(value: f64) -> SearchResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SearchError::invalid_configuration(format!(
            "observation must be finite and non-negative, got {}",
            value
        )))
    }
}
