//! Average-return estimation for a fixed policy
//!
//! The estimator is picked explicitly when it is built; there is no
//! inspection of the policy or algorithm type.

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    error::{PipelineError, Result},
    policy::Policy,
    sampler::{rollout, CollectorConfig, RolloutCollector, SampleTarget},
};

/// How the average return of a policy is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnEstimator {
    /// One path at a time from a rollout collector, reseeded before each path
    Sampler {
        /// Paths to average over
        n_paths: usize,
    },
    /// Serial rollouts on a single environment, each capped at `horizon`
    Episodic {
        /// Paths to average over
        n_paths: usize,
        /// Step cap per rollout
        horizon: usize,
    },
}

/// Result of [`ReturnEstimator::estimate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnEstimate {
    /// Mean undiscounted return
    pub average_return: f64,
    /// Paths rolled out
    pub paths: usize,
    /// Environment steps taken
    pub timesteps: usize,
}

impl ReturnEstimator {
    fn n_paths(&self) -> usize {
        match *self {
            Self::Sampler { n_paths } | Self::Episodic { n_paths, .. } => n_paths,
        }
    }

    /// Roll out `policy` and average the undiscounted returns
    ///
    /// Path `i` is seeded with `seed + i`.
    pub fn estimate<E, P, F>(&self, env_fn: F, policy: &P, max_path_length: usize, seed: u64) -> Result<ReturnEstimate>
    where
        E: Environment + Send,
        P: Policy + Clone + Send,
        F: Fn() -> E,
    {
        if self.n_paths() == 0 {
            return Err(PipelineError::Precondition("return estimate needs at least one path".to_string()));
        }

        let mut returns = Vec::with_capacity(self.n_paths());
        let mut timesteps = 0;
        match *self {
            Self::Sampler { n_paths } => {
                let config = CollectorConfig { max_path_length, seed: Some(seed), ..Default::default() };
                let mut collector = RolloutCollector::new(env_fn, policy, config)?;
                let params = policy.get_param_values();
                for i in 0..n_paths {
                    collector.reseed(seed.wrapping_add(i as u64));
                    let paths = collector.obtain_samples(&params, SampleTarget::Paths(1))?;
                    for path in paths.iter().take(1) {
                        timesteps += path.len();
                        returns.push(path.undiscounted_return());
                    }
                }
            }
            Self::Episodic { n_paths, horizon } => {
                let mut env = env_fn();
                let mut policy = policy.clone();
                for i in 0..n_paths {
                    let path_seed = seed.wrapping_add(i as u64);
                    env.seed(path_seed);
                    policy.seed(path_seed);
                    let path = rollout(&mut env, &mut policy, horizon.min(max_path_length))?;
                    timesteps += path.len();
                    returns.push(path.undiscounted_return());
                }
            }
        }

        let average_return = returns.iter().sum::<f64>() / returns.len().max(1) as f64;
        tracing::debug!("estimated average return {:.4} over {} paths", average_return, returns.len());
        Ok(ReturnEstimate { average_return, paths: returns.len(), timesteps })
    }
}
