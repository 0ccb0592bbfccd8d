//! Fixed-capacity circular replay buffer
//!
//! Stores `(observation, action, reward, terminal)` transitions in
//! pre-allocated flat arrays and hands out uniformly sampled minibatches of
//! `(s, a, r, terminal, s')` tuples, where `s'` is the observation stored in
//! the slot after `s`.
//!
//! # Index Layout
//!
//! ```text
//! capacity C = 5, after 7 insertions:
//!
//!   slot:     0    1    2    3    4
//!   insert:   #5   #6   #2   #3   #4
//!                  ^    ^
//!             newest    bottom = top
//! ```
//!
//! `top` is the next write slot; `bottom` is the oldest valid slot. The
//! newest slot is never handed out as a "current" transition: its successor
//! is either unwritten or the oldest transition, which belongs to a
//! different stretch of experience. All modulo arithmetic stays inside this
//! type.

use rand::Rng;

use crate::error::{PipelineError, Result};

const NORMALIZE_EPS: f32 = 1e-8;

/// Circular store of transitions with uniform minibatch sampling
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Maximum number of transitions kept
    capacity: usize,

    /// Observation dimensionality
    obs_dim: usize,

    /// Action dimensionality
    act_dim: usize,

    /// Observations: [capacity * obs_dim]
    observations: Vec<f32>,

    /// Actions: [capacity * act_dim]
    actions: Vec<f32>,

    /// Rewards: [capacity]
    rewards: Vec<f32>,

    /// Terminal flags: [capacity]
    terminals: Vec<bool>,

    /// Oldest valid slot
    bottom: usize,

    /// Next write slot
    top: usize,

    /// Number of valid transitions
    size: usize,
}

impl ReplayBuffer {
    /// Create an empty buffer
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of transitions, must be positive
    /// * `obs_dim` - Dimensionality of observations
    /// * `act_dim` - Dimensionality of actions
    pub fn new(capacity: usize, obs_dim: usize, act_dim: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::Config("replay capacity must be positive".to_string()));
        }

        Ok(Self {
            capacity,
            obs_dim,
            act_dim,
            observations: vec![0.0; capacity * obs_dim],
            actions: vec![0.0; capacity * act_dim],
            rewards: vec![0.0; capacity],
            terminals: vec![false; capacity],
            bottom: 0,
            top: 0,
            size: 0,
        })
    }

    /// Insert a transition, evicting the oldest one when full
    pub fn add(&mut self, observation: &[f32], action: &[f32], reward: f32, terminal: bool) {
        debug_assert_eq!(observation.len(), self.obs_dim, "observation dimension mismatch");
        debug_assert_eq!(action.len(), self.act_dim, "action dimension mismatch");

        let slot = self.top;
        self.observations[slot * self.obs_dim..(slot + 1) * self.obs_dim].copy_from_slice(observation);
        self.actions[slot * self.act_dim..(slot + 1) * self.act_dim].copy_from_slice(action);
        self.rewards[slot] = reward;
        self.terminals[slot] = terminal;

        self.top = (self.top + 1) % self.capacity;
        if self.size == self.capacity {
            self.bottom = (self.bottom + 1) % self.capacity;
        } else {
            self.size += 1;
        }
    }

    /// Sample `batch_size` transitions uniformly at random
    ///
    /// Requires strictly more stored transitions than `batch_size`.
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<TransitionBatch> {
        self.sample_batch_with(batch_size, |low, high| rng.gen_range(low..high))
    }

    /// Sample using a caller-supplied draw `draw(low, high)` in `[low, high)`
    ///
    /// Draws landing on the newest slot are rejected and redrawn.
    pub fn sample_batch_with<F>(&self, batch_size: usize, mut draw: F) -> Result<TransitionBatch>
    where
        F: FnMut(usize, usize) -> usize,
    {
        if self.size <= batch_size {
            return Err(PipelineError::Precondition(format!(
                "replay buffer holds {} transitions, need more than {} to sample",
                self.size, batch_size
            )));
        }

        let newest = self.newest_slot();
        let mut batch = TransitionBatch::with_capacity(batch_size);

        while batch.indices.len() < batch_size {
            let index = draw(self.bottom, self.bottom + self.size) % self.capacity;
            if Some(index) == newest {
                continue;
            }
            let next = (index + 1) % self.capacity;

            batch.indices.push(index);
            batch.observations.push(self.observation(index).to_vec());
            batch.actions.push(self.action(index).to_vec());
            batch.rewards.push(self.rewards[index]);
            batch.terminals.push(self.terminals[index]);
            batch.next_observations.push(self.observation(next).to_vec());
        }

        Ok(batch)
    }

    /// Per-dimension mean and standard deviation over all valid entries
    pub fn stats(&self) -> BufferStats {
        let (obs_mean, obs_std) = self.column_stats(&self.observations, self.obs_dim);
        let (act_mean, act_std) = self.column_stats(&self.actions, self.act_dim);
        BufferStats { obs_mean, obs_std, act_mean, act_std }
    }

    /// Number of valid transitions
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check if the buffer has started evicting
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Maximum number of transitions kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate valid transitions from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], &[f32], f32, bool)> + '_ {
        (0..self.size).map(move |k| {
            let i = (self.bottom + k) % self.capacity;
            (self.observation(i), self.action(i), self.rewards[i], self.terminals[i])
        })
    }

    fn newest_slot(&self) -> Option<usize> {
        if self.size == 0 {
            None
        } else {
            Some((self.top + self.capacity - 1) % self.capacity)
        }
    }

    fn observation(&self, slot: usize) -> &[f32] {
        &self.observations[slot * self.obs_dim..(slot + 1) * self.obs_dim]
    }

    fn action(&self, slot: usize) -> &[f32] {
        &self.actions[slot * self.act_dim..(slot + 1) * self.act_dim]
    }

    fn column_stats(&self, data: &[f32], dim: usize) -> (Vec<f32>, Vec<f32>) {
        if self.size == 0 {
            return (vec![0.0; dim], vec![0.0; dim]);
        }

        let n = self.size as f64;
        let mut mean = vec![0.0f64; dim];
        let mut sq = vec![0.0f64; dim];

        for k in 0..self.size {
            let slot = (self.bottom + k) % self.capacity;
            for (d, &x) in data[slot * dim..(slot + 1) * dim].iter().enumerate() {
                mean[d] += x as f64;
            }
        }
        for m in &mut mean {
            *m /= n;
        }
        for k in 0..self.size {
            let slot = (self.bottom + k) % self.capacity;
            for (d, &x) in data[slot * dim..(slot + 1) * dim].iter().enumerate() {
                sq[d] += (x as f64 - mean[d]).powi(2);
            }
        }

        let std = sq.iter().map(|s| (s / n).sqrt() as f32).collect();
        (mean.into_iter().map(|m| m as f32).collect(), std)
    }
}

/// Minibatch of `(s, a, r, terminal, s')` transitions
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    /// Buffer slots the transitions were read from
    pub indices: Vec<usize>,

    /// Current observations: [batch_size][obs_dim]
    pub observations: Vec<Vec<f32>>,

    /// Actions: [batch_size][act_dim]
    pub actions: Vec<Vec<f32>>,

    /// Rewards: [batch_size]
    pub rewards: Vec<f32>,

    /// Terminal flags: [batch_size]
    pub terminals: Vec<bool>,

    /// Successor observations: [batch_size][obs_dim]
    pub next_observations: Vec<Vec<f32>>,
}

impl TransitionBatch {
    fn with_capacity(n: usize) -> Self {
        Self {
            indices: Vec::with_capacity(n),
            observations: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminals: Vec::with_capacity(n),
            next_observations: Vec::with_capacity(n),
        }
    }

    /// Get batch size
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Standardize observations, successors and actions with buffer stats
    pub fn normalized(&self, stats: &BufferStats) -> Self {
        let norm = |rows: &[Vec<f32>], mean: &[f32], std: &[f32]| -> Vec<Vec<f32>> {
            rows.iter()
                .map(|row| {
                    row.iter()
                        .zip(mean)
                        .zip(std)
                        .map(|((&x, &m), &s)| (x - m) / (s + NORMALIZE_EPS))
                        .collect()
                })
                .collect()
        };

        Self {
            indices: self.indices.clone(),
            observations: norm(&self.observations, &stats.obs_mean, &stats.obs_std),
            actions: norm(&self.actions, &stats.act_mean, &stats.act_std),
            rewards: self.rewards.clone(),
            terminals: self.terminals.clone(),
            next_observations: norm(&self.next_observations, &stats.obs_mean, &stats.obs_std),
        }
    }
}

/// Per-dimension statistics of the valid buffer window
#[derive(Debug, Clone, PartialEq)]
pub struct BufferStats {
    /// Observation mean
    pub obs_mean: Vec<f32>,
    /// Observation standard deviation
    pub obs_std: Vec<f32>,
    /// Action mean
    pub act_mean: Vec<f32>,
    /// Action standard deviation
    pub act_std: Vec<f32>,
}
