//! Linear transition model
//!
//! Predicts `s' = W · [s, a, 1]` and learns by minibatch gradient descent on
//! the squared error plus `kl_factor · l2 · |W|²`. Surprise for a step is the
//! squared size of the parameter change that step would cause: the model is
//! copied, updated `n_itr_update` times on the single transition, and the
//! distance to the original weights is reported. A second-order update
//! replaces the iterated steps by one step scaled with the inverse diagonal
//! curvature of the squared error.
//!
//! The last step of a path has no recorded successor and gets zero surprise.

use anyhow::{anyhow, Result};

use super::optimizer::{DynamicsModel, SurpriseSettings};
use crate::buffer::{BufferStats, Path, TransitionBatch};

const NORMALIZE_EPS: f32 = 1e-8;

/// Linear next-observation predictor
#[derive(Debug, Clone)]
pub struct LinearDynamicsModel {
    obs_dim: usize,
    act_dim: usize,
    /// `[obs_dim][obs_dim + act_dim + 1]`
    weights: Vec<Vec<f64>>,
    learning_rate: f64,
    l2: f64,
}

impl LinearDynamicsModel {
    /// Create a zero-initialized model
    pub fn new(obs_dim: usize, act_dim: usize, learning_rate: f64) -> Self {
        Self {
            obs_dim,
            act_dim,
            weights: vec![vec![0.0; obs_dim + act_dim + 1]; obs_dim],
            learning_rate,
            l2: 1e-4,
        }
    }

    fn features(&self, observation: &[f32], action: &[f32]) -> Vec<f64> {
        observation
            .iter()
            .chain(action)
            .map(|&x| x as f64)
            .chain(std::iter::once(1.0))
            .collect()
    }

    fn predict(&self, features: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().zip(features).map(|(w, x)| w * x).sum())
            .collect()
    }

    fn check_dims(&self, observation: &[f32], action: &[f32]) -> Result<()> {
        if observation.len() != self.obs_dim || action.len() != self.act_dim {
            return Err(anyhow!(
                "transition has dims ({}, {}), model expects ({}, {})",
                observation.len(),
                action.len(),
                self.obs_dim,
                self.act_dim
            ));
        }
        Ok(())
    }

    /// Gradient of the mean squared error over `(features, target)` pairs
    fn gradient(&self, pairs: &[(Vec<f64>, Vec<f64>)], kl_factor: f64) -> Vec<Vec<f64>> {
        let mut grad = vec![vec![0.0; self.obs_dim + self.act_dim + 1]; self.obs_dim];
        let n = pairs.len().max(1) as f64;
        for (x, y) in pairs {
            let pred = self.predict(x);
            for (i, row) in grad.iter_mut().enumerate() {
                let err = pred[i] - y[i];
                for (g, xj) in row.iter_mut().zip(x) {
                    *g += 2.0 * err * xj / n;
                }
            }
        }
        for (row, w_row) in grad.iter_mut().zip(&self.weights) {
            for (g, w) in row.iter_mut().zip(w_row) {
                *g += 2.0 * kl_factor * self.l2 * w;
            }
        }
        grad
    }

    fn apply(&mut self, grad: &[Vec<f64>], scale: &[f64]) {
        for (w_row, g_row) in self.weights.iter_mut().zip(grad) {
            for ((w, g), s) in w_row.iter_mut().zip(g_row).zip(scale) {
                *w -= self.learning_rate * s * g;
            }
        }
    }

    fn distance_sq(&self, other: &Self) -> f64 {
        self.weights
            .iter()
            .flatten()
            .zip(other.weights.iter().flatten())
            .map(|(a, b)| (a - b).powi(2))
            .sum()
    }

    fn pairs(&self, batch: &TransitionBatch) -> Result<Vec<(Vec<f64>, Vec<f64>)>> {
        batch
            .observations
            .iter()
            .zip(&batch.actions)
            .zip(&batch.next_observations)
            .map(|((obs, act), next)| {
                self.check_dims(obs, act)?;
                Ok((self.features(obs, act), next.iter().map(|&x| x as f64).collect()))
            })
            .collect()
    }
}

fn normalize(row: &[f32], mean: &[f32], std: &[f32]) -> Vec<f32> {
    row.iter()
        .zip(mean)
        .zip(std)
        .map(|((&x, &m), &s)| (x - m) / (s + NORMALIZE_EPS))
        .collect()
}

impl DynamicsModel for LinearDynamicsModel {
    fn loss(&self, batch: &TransitionBatch) -> Result<f64> {
        let pairs = self.pairs(batch)?;
        if pairs.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = pairs
            .iter()
            .map(|(x, y)| {
                let pred = self.predict(x);
                pred.iter().zip(y).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / self.obs_dim.max(1) as f64
            })
            .sum();
        Ok(total / pairs.len() as f64)
    }

    fn train_batch(&mut self, batch: &TransitionBatch, kl_factor: f64) -> Result<()> {
        let pairs = self.pairs(batch)?;
        let grad = self.gradient(&pairs, kl_factor);
        let unit = vec![1.0; self.obs_dim + self.act_dim + 1];
        self.apply(&grad, &unit);
        Ok(())
    }

    fn surprise(&self, path: &Path, stats: Option<&BufferStats>, settings: SurpriseSettings) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; path.len()];
        for t in 0..path.len().saturating_sub(1) {
            let (obs, act, next) = match stats {
                Some(s) => (
                    normalize(&path.observations[t], &s.obs_mean, &s.obs_std),
                    normalize(&path.actions[t], &s.act_mean, &s.act_std),
                    normalize(&path.observations[t + 1], &s.obs_mean, &s.obs_std),
                ),
                None => (
                    path.observations[t].clone(),
                    path.actions[t].clone(),
                    path.observations[t + 1].clone(),
                ),
            };
            self.check_dims(&obs, &act)?;
            let pair = vec![(self.features(&obs, &act), next.iter().map(|&x| x as f64).collect::<Vec<f64>>())];

            let mut updated = self.clone();
            if settings.second_order_update {
                // Diagonal curvature of the squared error is 2·x²
                let scale: Vec<f64> = pair[0].0.iter().map(|x| 1.0 / (2.0 * x * x + 1.0)).collect();
                let grad = updated.gradient(&pair, 1.0);
                updated.apply(&grad, &scale);
            } else {
                let unit = vec![1.0; self.obs_dim + self.act_dim + 1];
                for _ in 0..settings.n_itr_update {
                    let grad = updated.gradient(&pair, 1.0);
                    updated.apply(&grad, &unit);
                }
            }
            out[t] = updated.distance_sq(self) as f32;
        }
        Ok(out)
    }
}
