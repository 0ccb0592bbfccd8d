//! Value-function baselines
//!
//! A baseline predicts, for every step of a path, the expected return from
//! that step on. The path processor subtracts these predictions inside the
//! TD residuals; the training loop refits the baseline after each batch.

use anyhow::Result;

use crate::{buffer::Path, process::ProcessedPath};

/// Core trait for baselines
pub trait Baseline {
    /// Fit to the returns of a processed batch
    fn fit(&mut self, paths: &[ProcessedPath]) -> Result<()>;

    /// Per-step value predictions for a path, one per step
    fn predict(&self, path: &Path) -> Vec<f32>;
}

/// Baseline that always predicts zero
///
/// With this baseline GAE at `λ = 1` yields plain discounted returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBaseline;

impl Baseline for ZeroBaseline {
    fn fit(&mut self, _paths: &[ProcessedPath]) -> Result<()> {
        Ok(())
    }

    fn predict(&self, path: &Path) -> Vec<f32> {
        vec![0.0; path.len()]
    }
}

pub mod linear_feature;

pub use linear_feature::LinearFeatureBaseline;
