//! Collaborator seams of the training loop
//!
//! Gradient computation and model internals live behind these traits. They
//! report failures as [`anyhow::Error`]; the loop wraps them as
//! [`crate::PipelineError::Collaborator`].

use anyhow::Result;

use crate::{
    buffer::{BufferStats, Path, TransitionBatch},
    logger::LogContext,
    policy::Policy,
    process::SamplesData,
};

/// Updates a policy from one processed batch
pub trait PolicyOptimizer<P: Policy + ?Sized> {
    /// Take one optimization step
    ///
    /// Optimizers may record their own diagnostics into `log`.
    fn optimize_policy(&mut self, itr: usize, policy: &mut P, samples: &SamplesData, log: &mut LogContext) -> Result<()>;
}

/// How a dynamics model turns a step into surprise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurpriseSettings {
    /// Model updates taken on a step before measuring the change
    pub n_itr_update: usize,
    /// Use a second-order approximation of the update
    pub second_order_update: bool,
}

/// Learned transition model fed from the replay pool
pub trait DynamicsModel {
    /// Mean squared prediction error on a normalized batch
    fn loss(&self, batch: &TransitionBatch) -> Result<f64>;

    /// One training step on a normalized batch
    ///
    /// `kl_factor` weights any complexity term of the model objective.
    fn train_batch(&mut self, batch: &TransitionBatch, kl_factor: f64) -> Result<()>;

    /// Per-step surprise for a path, one value per step
    ///
    /// `stats` are the replay pool's normalization statistics, when the pool
    /// has data.
    fn surprise(&self, path: &Path, stats: Option<&BufferStats>, settings: SurpriseSettings) -> Result<Vec<f32>>;
}
