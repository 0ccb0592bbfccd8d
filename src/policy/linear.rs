//! Linear Gaussian policy over continuous actions
//!
//! ```text
//! mean   = W · obs + b
//! action = mean + exp(log_std) ⊙ ε,   ε ~ N(0, I)
//! ```
//!
//! Parameters are laid out as `[W (row-major, act_dim x obs_dim), b, log_std]`.
//! The score function `∇θ log π(a | s)` is available in closed form, which is
//! all a vanilla policy-gradient step needs.

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use super::{DifferentiablePolicy, Policy};
use crate::buffer::{InfoDict, TensorDict};

const MEAN_KEY: &str = "mean";
const LOG_STD_KEY: &str = "log_std";

/// Diagonal Gaussian policy with a linear mean
#[derive(Debug, Clone)]
pub struct LinearGaussianPolicy {
    obs_dim: usize,
    act_dim: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
    log_std: Vec<f32>,
    deterministic: bool,
    rng: StdRng,
}

impl LinearGaussianPolicy {
    /// Create a zero-mean policy with the given initial log standard deviation
    pub fn new(obs_dim: usize, act_dim: usize, init_log_std: f32) -> Self {
        Self {
            obs_dim,
            act_dim,
            weights: vec![0.0; obs_dim * act_dim],
            bias: vec![0.0; act_dim],
            log_std: vec![init_log_std; act_dim],
            deterministic: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Return the mean action instead of sampling
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Number of parameters
    pub fn num_params(&self) -> usize {
        self.weights.len() + self.bias.len() + self.log_std.len()
    }

    /// Observation dimensionality
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Action dimensionality
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Mean action for an observation
    pub fn mean(&self, observation: &[f32]) -> Vec<f32> {
        (0..self.act_dim)
            .map(|i| {
                let row = &self.weights[i * self.obs_dim..(i + 1) * self.obs_dim];
                row.iter().zip(observation).map(|(w, o)| w * o).sum::<f32>() + self.bias[i]
            })
            .collect()
    }
}

impl Policy for LinearGaussianPolicy {
    fn get_param_values(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.num_params());
        params.extend_from_slice(&self.weights);
        params.extend_from_slice(&self.bias);
        params.extend_from_slice(&self.log_std);
        params
    }

    fn set_param_values(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(anyhow!(
                "expected {} parameters, got {}",
                self.num_params(),
                params.len()
            ));
        }
        let (w, rest) = params.split_at(self.weights.len());
        let (b, log_std) = rest.split_at(self.bias.len());
        self.weights.copy_from_slice(w);
        self.bias.copy_from_slice(b);
        self.log_std.copy_from_slice(log_std);
        Ok(())
    }

    fn get_action(&mut self, observation: &[f32]) -> Result<(Vec<f32>, InfoDict)> {
        if observation.len() != self.obs_dim {
            return Err(anyhow!(
                "observation has {} dims, policy expects {}",
                observation.len(),
                self.obs_dim
            ));
        }

        let mean = self.mean(observation);
        let action = if self.deterministic {
            mean.clone()
        } else {
            let rng = &mut self.rng;
            mean.iter()
                .zip(&self.log_std)
                .map(|(m, ls)| {
                    let eps: f32 = StandardNormal.sample(&mut *rng);
                    m + ls.exp() * eps
                })
                .collect()
        };

        let mut info = InfoDict::new();
        info.insert(MEAN_KEY.to_string(), mean);
        info.insert(LOG_STD_KEY.to_string(), self.log_std.clone());
        Ok((action, info))
    }

    fn entropy(&self, agent_infos: &TensorDict) -> Option<f64> {
        let log_stds = agent_infos.get(LOG_STD_KEY)?;
        if log_stds.is_empty() {
            return None;
        }
        let half_ln_2pi_e = 0.5 * (2.0 * std::f64::consts::PI * std::f64::consts::E).ln();
        let total: f64 = log_stds
            .iter()
            .map(|row| row.iter().map(|&ls| ls as f64 + half_ln_2pi_e).sum::<f64>())
            .sum();
        Some(total / log_stds.len() as f64)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

impl DifferentiablePolicy for LinearGaussianPolicy {
    fn log_likelihood(&self, observation: &[f32], action: &[f32]) -> f32 {
        let mean = self.mean(observation);
        let ln_2pi = (2.0 * std::f32::consts::PI).ln();
        (0..self.act_dim)
            .map(|i| {
                let z = (action[i] - mean[i]) / self.log_std[i].exp();
                -0.5 * z * z - self.log_std[i] - 0.5 * ln_2pi
            })
            .sum()
    }

    fn grad_log_likelihood(&self, observation: &[f32], action: &[f32]) -> Vec<f32> {
        let mean = self.mean(observation);
        let mut grad = vec![0.0; self.num_params()];
        let bias_offset = self.weights.len();
        let log_std_offset = bias_offset + self.bias.len();

        for i in 0..self.act_dim {
            let std = self.log_std[i].exp();
            let z = (action[i] - mean[i]) / std;
            let d_mean = z / std;

            for (j, &o) in observation.iter().enumerate().take(self.obs_dim) {
                grad[i * self.obs_dim + j] = d_mean * o;
            }
            grad[bias_offset + i] = d_mean;
            grad[log_std_offset + i] = z * z - 1.0;
        }

        grad
    }
}
