//! Parallel rollout collection
//!
//! A fixed pool of `n_parallel` workers, each owning its own environment
//! copies and its own policy clone. Before every sampling phase the
//! coordinator's parameter vector is loaded into each worker's policy, so all
//! rollouts of an iteration run the same snapshot. Workers run on Rayon's
//! thread pool and never talk to each other; the coordinator waits for all
//! of them before returning.
//!
//! # Example
//!
//! ```rust
//! use trajectory_rl::{
//!     env::simple_bandit::SimpleBandit,
//!     policy::{linear::LinearGaussianPolicy, Policy},
//!     sampler::{CollectorConfig, RolloutCollector, SampleTarget},
//! };
//!
//! let policy = LinearGaussianPolicy::new(1, 1, 0.0);
//! let config = CollectorConfig { n_parallel: 2, max_path_length: 10, ..Default::default() };
//! let mut collector = RolloutCollector::new(|| SimpleBandit::with_episode_length(5), &policy, config).unwrap();
//!
//! let paths = collector.obtain_samples(&policy.get_param_values(), SampleTarget::Samples(12)).unwrap();
//! assert!(paths.iter().map(|p| p.len()).sum::<usize>() >= 12);
//! ```

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{rollout::rollout, vectorized::vectorized_rollouts, RetryBudget, SampleTarget};
use crate::{
    buffer::Path,
    env::Environment,
    error::{PipelineError, Result},
    policy::Policy,
};

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Number of workers
    pub n_parallel: usize,
    /// Environments stepped in lock step per worker
    pub envs_per_worker: usize,
    /// Path-length cap
    pub max_path_length: usize,
    /// Keep whole paths instead of truncating to the sample target
    pub whole_paths: bool,
    /// Failed rollouts each worker may discard per phase
    pub max_rollout_retries: usize,
    /// Base seed; worker `w` uses `seed + w`
    pub seed: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            n_parallel: 1,
            envs_per_worker: 1,
            max_path_length: 500,
            whole_paths: true,
            max_rollout_retries: 3,
            seed: None,
        }
    }
}

impl CollectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.n_parallel == 0 {
            return Err(PipelineError::Config("n_parallel must be > 0".to_string()));
        }
        if self.envs_per_worker == 0 {
            return Err(PipelineError::Config("envs_per_worker must be > 0".to_string()));
        }
        if self.max_path_length == 0 {
            return Err(PipelineError::Config("max_path_length must be > 0".to_string()));
        }
        Ok(())
    }
}

/// One worker: private environments and policy
struct Worker<E, P> {
    envs: Vec<E>,
    policy: P,
}

impl<E: Environment, P: Policy> Worker<E, P> {
    fn collect(&mut self, params: &[f32], target: SampleTarget, config: &CollectorConfig) -> Result<Vec<Path>> {
        self.policy.set_param_values(params)?;
        let mut budget = RetryBudget::new(config.max_rollout_retries);

        if self.envs.len() > 1 {
            return vectorized_rollouts(&mut self.envs, &mut self.policy, config.max_path_length, target, &mut budget);
        }

        let mut paths = Vec::new();
        let mut samples = 0;
        while !target.is_met(paths.len(), samples) {
            match self.rollout_one(config.max_path_length) {
                Ok(path) => {
                    samples += path.len();
                    paths.push(path);
                }
                Err(e) => budget.record(e)?,
            }
        }
        Ok(paths)
    }

    fn evaluate(&mut self, params: &[f32], config: &CollectorConfig) -> Result<Path> {
        self.policy.set_param_values(params)?;
        let mut budget = RetryBudget::new(config.max_rollout_retries);
        loop {
            match self.rollout_one(config.max_path_length) {
                Ok(path) => return Ok(path),
                Err(e) => budget.record(e)?,
            }
        }
    }

    /// Worker `w` uses `seed + w`; its `j`-th environment adds `j * n_parallel`
    fn seed(&mut self, seed: u64, w: usize, n_parallel: usize) {
        let worker_seed = seed.wrapping_add(w as u64);
        self.policy.seed(worker_seed);
        for (j, env) in self.envs.iter_mut().enumerate() {
            env.seed(worker_seed.wrapping_add((j * n_parallel) as u64));
        }
    }

    fn rollout_one(&mut self, max_path_length: usize) -> anyhow::Result<Path> {
        let env = self
            .envs
            .first_mut()
            .ok_or_else(|| anyhow::anyhow!("worker has no environment"))?;
        rollout(env, &mut self.policy, max_path_length)
    }
}

/// Pool of rollout workers sharing one parameter snapshot per phase
pub struct RolloutCollector<E, P> {
    workers: Vec<Worker<E, P>>,
    config: CollectorConfig,
}

impl<E, P> RolloutCollector<E, P>
where
    E: Environment + Send,
    P: Policy + Clone + Send,
{
    /// Create the pool
    ///
    /// # Arguments
    ///
    /// * `env_fn` - Factory called once per environment copy
    /// * `policy` - Prototype cloned into every worker
    /// * `config` - Pool settings
    pub fn new<F>(env_fn: F, policy: &P, config: CollectorConfig) -> Result<Self>
    where
        F: Fn() -> E,
    {
        config.validate()?;

        let workers = (0..config.n_parallel)
            .map(|w| {
                let envs: Vec<E> = (0..config.envs_per_worker).map(|_| env_fn()).collect();
                let mut worker = Worker { envs, policy: policy.clone() };
                if let Some(seed) = config.seed {
                    worker.seed(seed, w, config.n_parallel);
                }
                worker
            })
            .collect();

        Ok(Self { workers, config })
    }

    /// Pool settings
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Number of workers
    pub fn n_workers(&self) -> usize {
        self.workers.len()
    }

    /// Reseed every worker's environments and policy from a new base seed
    pub fn reseed(&mut self, seed: u64) {
        let n_parallel = self.config.n_parallel;
        for (w, worker) in self.workers.iter_mut().enumerate() {
            worker.seed(seed, w, n_parallel);
        }
        self.config.seed = Some(seed);
    }

    /// Collect paths under the parameter snapshot `params`
    ///
    /// With a sample target the total length is at least the target unless
    /// `whole_paths` is off, in which case the batch is cut to exactly the
    /// target.
    pub fn obtain_samples(&mut self, params: &[f32], target: SampleTarget) -> Result<Vec<Path>> {
        let shares = target.split(self.workers.len());
        let config = &self.config;

        let results: Vec<Result<Vec<Path>>> = self
            .workers
            .par_iter_mut()
            .zip(shares.into_par_iter())
            .map(|(worker, share)| worker.collect(params, share, config))
            .collect();

        let mut paths = Vec::new();
        for result in results {
            paths.extend(result?);
        }

        if let SampleTarget::Samples(n) = target {
            if !self.config.whole_paths {
                paths = truncate_paths(paths, n);
            }
        }
        tracing::debug!(
            "collected {} paths, {} samples",
            paths.len(),
            paths.iter().map(Path::len).sum::<usize>()
        );
        Ok(paths)
    }

    /// Roll out one path per candidate parameter vector
    ///
    /// Candidates are spread round-robin over the workers; the returned
    /// paths are in candidate order.
    pub fn evaluate_params(&mut self, candidates: &[Vec<f32>]) -> Result<Vec<Path>> {
        let n_workers = self.workers.len();
        let config = &self.config;

        let results: Vec<Result<Vec<(usize, Path)>>> = self
            .workers
            .par_iter_mut()
            .enumerate()
            .map(|(w, worker)| {
                candidates
                    .iter()
                    .enumerate()
                    .skip(w)
                    .step_by(n_workers)
                    .map(|(i, params)| worker.evaluate(params, config).map(|path| (i, path)))
                    .collect()
            })
            .collect();

        let mut indexed = Vec::with_capacity(candidates.len());
        for result in results {
            indexed.extend(result?);
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, path)| path).collect())
    }
}

/// Cut a batch to exactly `max_samples` steps
///
/// Trailing paths that are not needed are dropped and the last kept path is
/// shortened. Batches already at or below the limit are returned unchanged.
pub fn truncate_paths(mut paths: Vec<Path>, max_samples: usize) -> Vec<Path> {
    let mut total: usize = paths.iter().map(Path::len).sum();
    while let Some(last) = paths.last() {
        if total - last.len() >= max_samples && total > max_samples {
            total -= last.len();
            paths.pop();
        } else {
            break;
        }
    }
    if total > max_samples {
        if let Some(last) = paths.pop() {
            let keep = last.len() - (total - max_samples);
            paths.push(last.truncated(keep));
        }
    }
    paths
}
