//! Intrinsic-reward shaping from a per-step surprise signal
//!
//! Order of operations, per batch:
//!
//! ```text
//! raw surprise -> transform -> normalize -> × eta -> added to rewards
//! ```
//!
//! The transform is applied per path; normalization divides every path by a
//! single batch-level statistic.

use serde::{Deserialize, Serialize};

use super::special::{median, percentile, Distribution};
use crate::{logger::LogContext, utils::MovingStat};

const FIXED_CAP: f32 = 1000.0;
const NORM_EPS: f64 = 1e-8;

/// Monotone transform applied to raw surprise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurpriseTransform {
    /// Use raw values
    #[default]
    None,
    /// `log(1 + x)`
    Log1p,
    /// Cap at the batch's 90th percentile
    Cap90Percentile,
    /// Cap at 1000
    Cap1000,
}

/// Batch-level divisor for transformed surprise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KlNormalization {
    /// No normalization
    #[default]
    None,
    /// Divide by the current batch median
    CurrentBatchMedian,
    /// Divide by the mean of the last `kl_q_len` batch medians
    MovingMedian,
}

/// Intrinsic-reward settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicConfig {
    /// Mixing coefficient applied after normalization
    pub eta: f64,
    /// Per-path transform
    pub transform: SurpriseTransform,
    /// Batch normalization
    pub normalization: KlNormalization,
}

impl Default for IntrinsicConfig {
    fn default() -> Self {
        Self {
            eta: 1e-4,
            transform: SurpriseTransform::None,
            normalization: KlNormalization::None,
        }
    }
}

/// Surprise distributions at each shaping stage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KlStats {
    /// Before the transform
    pub raw: Distribution,
    /// After the transform
    pub transformed: Distribution,
    /// After normalization
    pub normalized: Distribution,
}

impl KlStats {
    /// Record `BNN_*KL`, `BNN_*KL_transf` and `BNN_*KL_norm`
    pub fn record(&self, log: &mut LogContext) {
        let stages = [(&self.raw, "KL"), (&self.transformed, "KL_transf"), (&self.normalized, "KL_norm")];
        for (dist, suffix) in stages {
            for (key, value) in dist.entries("BNN_", suffix) {
                log.record_tabular(&key, value);
            }
        }
    }
}

/// Apply a transform to every path in place
pub fn apply_transform(surprise: &mut [Vec<f32>], transform: SurpriseTransform) {
    let cap = match transform {
        SurpriseTransform::None => return,
        SurpriseTransform::Log1p => {
            for x in surprise.iter_mut().flatten() {
                *x = x.ln_1p();
            }
            return;
        }
        SurpriseTransform::Cap90Percentile => percentile(&surprise.concat(), 90.0) as f32,
        SurpriseTransform::Cap1000 => FIXED_CAP,
    };
    for x in surprise.iter_mut().flatten() {
        *x = x.min(cap);
    }
}

/// Stateful shaper holding the moving median queue
#[derive(Debug, Clone)]
pub struct SurpriseShaper {
    config: IntrinsicConfig,
    previous_medians: MovingStat,
}

impl SurpriseShaper {
    /// Create a shaper whose moving normalizer spans `kl_q_len` batches
    pub fn new(config: IntrinsicConfig, kl_q_len: usize) -> Self {
        Self {
            config,
            previous_medians: MovingStat::new(kl_q_len.max(1)),
        }
    }

    /// Settings in use
    pub fn config(&self) -> &IntrinsicConfig {
        &self.config
    }

    /// Transform and normalize per-path surprise, then scale by `eta`
    ///
    /// Returns the per-path bonuses to add to rewards and the distribution
    /// of the signal at each stage.
    pub fn shape(&mut self, mut surprise: Vec<Vec<f32>>) -> (Vec<Vec<f32>>, KlStats) {
        let raw = Distribution::of(&surprise.concat());

        apply_transform(&mut surprise, self.config.transform);
        let transformed = Distribution::of(&surprise.concat());

        let divisor = match self.config.normalization {
            KlNormalization::None => None,
            KlNormalization::CurrentBatchMedian => Some(median(&surprise.concat())),
            KlNormalization::MovingMedian => {
                self.previous_medians.push(median(&surprise.concat()));
                Some(self.previous_medians.mean())
            }
        };
        if let Some(divisor) = divisor {
            let divisor = divisor + NORM_EPS;
            for x in surprise.iter_mut().flatten() {
                *x = (*x as f64 / divisor) as f32;
            }
        }
        let normalized = Distribution::of(&surprise.concat());

        let eta = self.config.eta;
        for x in surprise.iter_mut().flatten() {
            *x = (*x as f64 * eta) as f32;
        }

        (surprise, KlStats { raw, transformed, normalized })
    }
}
