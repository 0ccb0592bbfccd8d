//! Experience collection
//!
//! - [`rollout`]: one episode on one environment
//! - [`vectorized`]: several environments stepped in lock step by one policy
//! - [`collector`]: a rayon worker pool running a shared parameter snapshot
//!
//! Environment and policy failures during a rollout are recoverable up to a
//! retry budget: the partial path is dropped, a warning is logged and a fresh
//! episode starts. Past the budget the failure surfaces as
//! [`PipelineError::Rollout`].

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub mod collector;
pub mod rollout;
pub mod vectorized;

pub use collector::{truncate_paths, CollectorConfig, RolloutCollector};
pub use rollout::rollout;
pub use vectorized::vectorized_rollouts;

/// How much experience to gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleTarget {
    /// At least this many steps, in whole paths
    Samples(usize),
    /// Exactly this many complete paths, including under lock-step sampling
    Paths(usize),
}

impl SampleTarget {
    /// Whether `paths` paths holding `samples` steps satisfy the target
    pub fn is_met(&self, paths: usize, samples: usize) -> bool {
        match *self {
            SampleTarget::Samples(n) => samples >= n,
            SampleTarget::Paths(n) => paths >= n,
        }
    }

    /// Split across `workers` so the shares add up to the whole
    ///
    /// The first `n % workers` workers take one extra unit.
    pub fn split(&self, workers: usize) -> Vec<SampleTarget> {
        let (n, make): (usize, fn(usize) -> SampleTarget) = match *self {
            SampleTarget::Samples(n) => (n, SampleTarget::Samples),
            SampleTarget::Paths(n) => (n, SampleTarget::Paths),
        };
        let workers = workers.max(1);
        (0..workers)
            .map(|w| make(n / workers + usize::from(w < n % workers)))
            .collect()
    }
}

/// Counts recoverable rollout failures against a budget
#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_retries: usize,
    failures: usize,
}

impl RetryBudget {
    /// Allow up to `max_retries` discarded rollouts
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries, failures: 0 }
    }

    /// Failures recorded so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Record a failed rollout, erroring once the budget is exhausted
    pub fn record(&mut self, error: anyhow::Error) -> Result<()> {
        self.failures += 1;
        if self.failures > self.max_retries {
            return Err(PipelineError::Rollout { attempts: self.failures, source: error });
        }
        tracing::warn!(
            "discarding failed rollout ({}/{} retries): {:#}",
            self.failures,
            self.max_retries,
            error
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_adds_up() {
        let shares = SampleTarget::Samples(10).split(4);
        assert_eq!(
            shares,
            vec![
                SampleTarget::Samples(3),
                SampleTarget::Samples(3),
                SampleTarget::Samples(2),
                SampleTarget::Samples(2)
            ]
        );
        assert_eq!(SampleTarget::Paths(1).split(3)[2], SampleTarget::Paths(0));
    }

    #[test]
    fn test_target_met() {
        assert!(SampleTarget::Samples(5).is_met(1, 5));
        assert!(!SampleTarget::Samples(5).is_met(10, 4));
        assert!(SampleTarget::Paths(2).is_met(2, 0));
    }

    #[test]
    fn test_retry_budget() {
        let mut budget = RetryBudget::new(1);
        assert!(budget.record(anyhow::anyhow!("first")).is_ok());
        let err = budget.record(anyhow::anyhow!("second")).unwrap_err();
        assert!(matches!(err, PipelineError::Rollout { attempts: 2, .. }));
        assert_eq!(budget.failures(), 2);
    }
}
