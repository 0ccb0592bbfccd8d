//! Training configuration
//!
//! This module defines the configuration of a batch training run and
//! provides validation, JSON loading and builder pattern methods.
//! Inconsistent settings are rejected when the run starts, never mid-run.

use std::path::{Path as FsPath, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, Result},
    logger::SnapshotMode,
    process::{IntrinsicConfig, ProcessorConfig},
    sampler::CollectorConfig,
};

/// Replay pool feeding a dynamics model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Capacity of the circular buffer
    pub pool_size: usize,

    /// Minimum fill before the model is trained
    pub min_pool_size: usize,

    /// Transitions drawn per iteration (split into minibatches)
    pub n_updates_per_sample: usize,

    /// Minibatch size
    pub pool_batch_size: usize,

    /// Multiplier applied to the KL factor after every model update
    pub replay_kl_schedule: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            pool_size: 100_000,
            min_pool_size: 500,
            n_updates_per_sample: 500,
            pool_batch_size: 10,
            replay_kl_schedule: 1.0,
        }
    }
}

impl ReplayConfig {
    /// Minibatches drawn per iteration
    pub fn updates_per_iteration(&self) -> usize {
        self.n_updates_per_sample / self.pool_batch_size.max(1)
    }
}

/// Batch training configuration
///
/// Default values follow common settings for small continuous-control
/// problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of iterations (exclusive upper bound on the iteration index)
    pub n_itr: usize,

    /// First iteration index, for resumed runs
    pub start_itr: usize,

    /// Environment steps collected per iteration
    pub batch_size: usize,

    /// Path-length cap
    pub max_path_length: usize,

    /// Discount factor (gamma)
    pub discount: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// Keep whole paths even if the batch overshoots `batch_size`
    pub whole_paths: bool,

    /// Standardize advantages
    pub center_adv: bool,

    /// Shift advantages to be positive
    pub positive_adv: bool,

    /// Include processed paths in snapshots
    pub store_paths: bool,

    /// Number of sampling workers
    pub n_parallel: usize,

    /// Environments per worker stepped in lock step
    pub envs_per_worker: usize,

    /// Failed rollouts a worker may discard per iteration
    pub max_rollout_retries: usize,

    /// Normalize rewards with moving statistics
    pub normalize_reward: bool,

    /// Length of moving statistic queues
    pub kl_q_len: usize,

    /// Intrinsic-reward shaping
    pub intrinsic: Option<IntrinsicConfig>,

    /// Replay pool for a dynamics model
    pub replay: Option<ReplayConfig>,

    /// Second-order surprise updates in the dynamics model
    pub second_order_update: bool,

    /// Model updates used when computing surprise
    pub n_itr_update: usize,

    /// Base random seed
    pub seed: Option<u64>,

    /// Snapshot directory
    pub snapshot_dir: Option<PathBuf>,

    /// Which snapshots to keep
    pub snapshot_mode: SnapshotMode,

    /// Padding value for recurrent batches
    pub pad_value: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_itr: 500,
            start_itr: 0,
            batch_size: 5000,
            max_path_length: 500,
            discount: 0.99,
            gae_lambda: 1.0,
            whole_paths: true,
            center_adv: true,
            positive_adv: false,
            store_paths: false,
            n_parallel: 1,
            envs_per_worker: 1,
            max_rollout_retries: 3,
            normalize_reward: false,
            kl_q_len: 10,
            intrinsic: None,
            replay: None,
            second_order_update: false,
            n_itr_update: 1,
            seed: None,
            snapshot_dir: None,
            snapshot_mode: SnapshotMode::Last,
            pad_value: 0.0,
        }
    }
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::Config(message.to_string())
}

impl TrainConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.start_itr > self.n_itr {
            return Err(invalid("start_itr must not exceed n_itr"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be positive"));
        }
        if self.max_path_length == 0 {
            return Err(invalid("max_path_length must be positive"));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(invalid("discount must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(invalid("gae_lambda must be in [0, 1]"));
        }
        if self.n_parallel == 0 {
            return Err(invalid("n_parallel must be positive"));
        }
        if self.envs_per_worker == 0 {
            return Err(invalid("envs_per_worker must be positive"));
        }
        if self.kl_q_len == 0 {
            return Err(invalid("kl_q_len must be positive"));
        }
        if self.n_itr_update == 0 {
            return Err(invalid("n_itr_update must be positive"));
        }
        if self.second_order_update && self.n_itr_update != 1 {
            return Err(invalid("second_order_update requires n_itr_update == 1"));
        }
        if let Some(intrinsic) = &self.intrinsic {
            if !intrinsic.eta.is_finite() || intrinsic.eta < 0.0 {
                return Err(invalid("intrinsic eta must be finite and non-negative"));
            }
        }
        if let Some(replay) = &self.replay {
            if replay.pool_size == 0 {
                return Err(invalid("replay pool_size must be positive"));
            }
            if replay.pool_batch_size == 0 {
                return Err(invalid("replay pool_batch_size must be positive"));
            }
            if replay.min_pool_size > replay.pool_size {
                return Err(invalid("replay min_pool_size must not exceed pool_size"));
            }
            if replay.min_pool_size <= replay.pool_batch_size {
                return Err(invalid("replay min_pool_size must exceed pool_batch_size"));
            }
            if replay.replay_kl_schedule <= 0.0 {
                return Err(invalid("replay_kl_schedule must be positive"));
            }
        }
        Ok(())
    }

    /// Settings for the path processor
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            discount: self.discount,
            gae_lambda: self.gae_lambda,
            center_adv: self.center_adv,
            positive_adv: self.positive_adv,
            normalize_reward: self.normalize_reward,
            kl_q_len: self.kl_q_len,
            intrinsic: self.intrinsic,
            pad_value: self.pad_value,
        }
    }

    /// Settings for the rollout collector
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            n_parallel: self.n_parallel,
            envs_per_worker: self.envs_per_worker,
            max_path_length: self.max_path_length,
            whole_paths: self.whole_paths,
            max_rollout_retries: self.max_rollout_retries,
            seed: self.seed,
        }
    }

    /// Set number of iterations
    pub fn n_itr(mut self, n_itr: usize) -> Self {
        self.n_itr = n_itr;
        self
    }

    /// Set samples per iteration
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set path-length cap
    pub fn max_path_length(mut self, len: usize) -> Self {
        self.max_path_length = len;
        self
    }

    /// Set discount factor
    pub fn discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set number of sampling workers
    pub fn n_parallel(mut self, n: usize) -> Self {
        self.n_parallel = n;
        self
    }

    /// Set environments per worker
    pub fn envs_per_worker(mut self, n: usize) -> Self {
        self.envs_per_worker = n;
        self
    }

    /// Enable intrinsic-reward shaping
    pub fn intrinsic(mut self, intrinsic: IntrinsicConfig) -> Self {
        self.intrinsic = Some(intrinsic);
        self
    }

    /// Enable the replay pool
    pub fn replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = Some(replay);
        self
    }

    /// Set random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Write snapshots to `dir`
    pub fn snapshots(mut self, dir: impl Into<PathBuf>, mode: SnapshotMode) -> Self {
        self.snapshot_dir = Some(dir.into());
        self.snapshot_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discount, 0.99);
        assert_eq!(config.batch_size, 5000);
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainConfig::new().batch_size(0).validate().is_err());
        assert!(TrainConfig::new().discount(1.5).validate().is_err());
        assert!(TrainConfig::new().gae_lambda(-0.1).validate().is_err());
        assert!(TrainConfig::new().n_parallel(0).validate().is_err());
        assert!(TrainConfig::new().max_path_length(0).validate().is_err());
    }

    #[test]
    fn test_second_order_update_needs_single_update() {
        let config = TrainConfig { second_order_update: true, n_itr_update: 5, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref msg) if msg.contains("n_itr_update")));

        let config = TrainConfig { second_order_update: true, n_itr_update: 1, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replay_validation() {
        let bad = ReplayConfig { min_pool_size: 5, pool_batch_size: 10, ..Default::default() };
        assert!(TrainConfig::new().replay(bad).validate().is_err());

        let good = ReplayConfig { pool_size: 100, min_pool_size: 20, pool_batch_size: 4, ..Default::default() };
        assert!(TrainConfig::new().replay(good.clone()).validate().is_ok());
        assert_eq!(good.updates_per_iteration(), 125);
    }

    #[test]
    fn test_builder_pattern() {
        let config = TrainConfig::new().n_itr(10).batch_size(200).discount(0.9).seed(3);
        assert_eq!(config.n_itr, 10);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.discount, 0.9);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.collector_config().seed, Some(3));
        assert_eq!(config.processor_config().discount, 0.9);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"n_itr": 3, "batch_size": 64, "intrinsic": {"eta": 0.01, "transform": "cap1000"}}"#,
        )
        .unwrap();

        let config = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n_itr, 3);
        assert_eq!(config.max_path_length, 500);
        let intrinsic = config.intrinsic.unwrap();
        assert_eq!(intrinsic.transform, crate::process::SurpriseTransform::Cap1000);

        std::fs::write(&path, r#"{"second_order_update": true, "n_itr_update": 2}"#).unwrap();
        assert!(matches!(TrainConfig::from_json_file(&path), Err(PipelineError::Config(_))));
    }
}
