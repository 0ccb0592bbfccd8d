//! # trajectory-rl
//!
//! Experience collection and batch trajectory processing for policy-search
//! reinforcement learning.
//!
//! The crate covers the part of an RL stack between the environment and the
//! gradient step: a rayon worker pool that rolls out whole paths under one
//! parameter snapshot, a path processor that turns those paths into
//! training tensors (discounted returns, GAE, advantage centering, intrinsic
//! reward shaping, padding for recurrent policies), a circular replay pool
//! for model learning, and a training loop tying them together. Network
//! architectures and environment physics stay behind small traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trajectory_rl::prelude::*;
//! use trajectory_rl::env::simple_bandit::SimpleBandit;
//!
//! let config = TrainConfig::new().n_itr(20).batch_size(1000).max_path_length(100);
//! let mut training = TrainingLoop::new(
//!     SimpleBandit::new,
//!     LinearGaussianPolicy::new(1, 1, 0.0),
//!     LinearFeatureBaseline::default(),
//!     VanillaPolicyGradient::new(0.05),
//!     config,
//! )?;
//! let stats = training.train()?;
//! println!("best average return: {:.3}", stats.best_average_return);
//! # Ok::<(), trajectory_rl::PipelineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Value-function baselines
pub mod baseline;

/// Paths, tensor dictionaries and the replay pool
pub mod buffer;

/// Environment traits and implementations
pub mod env;

/// Error taxonomy
pub mod error;

/// Explicit logging context and snapshots
pub mod logger;

/// Policy interface and a linear reference policy
pub mod policy;

/// Turning paths into training tensors
pub mod process;

/// Rollouts and the worker pool
pub mod sampler;

/// Training algorithms and the batch loop
pub mod train;

/// Utility functions and helpers
pub mod utils;

pub use error::{PipelineError, Result};

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        baseline::{Baseline, LinearFeatureBaseline, ZeroBaseline},
        buffer::{Path, ReplayBuffer},
        env::Environment,
        error::{PipelineError, Result},
        logger::{LogContext, SnapshotMode},
        policy::{linear::LinearGaussianPolicy, DifferentiablePolicy, Policy},
        process::{PathProcessor, ProcessorConfig, SamplesData},
        sampler::{CollectorConfig, RolloutCollector, SampleTarget},
        train::{Cem, CemConfig, PolicyOptimizer, TrainConfig, TrainingLoop, VanillaPolicyGradient},
    };
}

/// Current version of trajectory-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
