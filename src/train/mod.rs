//! Training algorithms
//!
//! - [`trainer::TrainingLoop`]: the batch sample/process/optimize loop
//! - [`vpg::VanillaPolicyGradient`]: likelihood-ratio policy gradient
//! - [`cem::Cem`]: cross-entropy method over the parameter vector
//! - [`evaluate::ReturnEstimator`]: average return of a fixed policy

pub mod cem;
pub mod config;
pub mod dynamics;
pub mod evaluate;
pub mod optimizer;
pub mod stats;
pub mod trainer;
pub mod vpg;

pub use cem::{Cem, CemConfig};
pub use config::{ReplayConfig, TrainConfig};
pub use dynamics::LinearDynamicsModel;
pub use evaluate::{ReturnEstimate, ReturnEstimator};
pub use optimizer::{DynamicsModel, PolicyOptimizer, SurpriseSettings};
pub use stats::{AggregatedStats, IterationStats};
pub use trainer::{Phase, TrainingLoop};
pub use vpg::VanillaPolicyGradient;
