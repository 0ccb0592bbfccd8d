//! Simple Contextual Bandit Environment
//!
//! A trivial environment for checking that the pipeline learns at all:
//! - State: Single binary value (0 or 1)
//! - Action: One continuous value
//! - Optimal policy: Always output action = state
//! - Reward: `1 - (action - state)^2`
//! - Episodes: Fixed length of `max_steps`, then `done`
//!
//! Steps report the distance to the target in their info mapping so the
//! env-info plumbing has something to carry.

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Environment, SpaceInfo, SpaceType, StepResult};

/// Simple contextual bandit with continuous actions
#[derive(Debug)]
pub struct SimpleBandit {
    state: f32,
    steps: usize,
    max_steps: usize,
    rng: StdRng,
}

impl SimpleBandit {
    /// Create a new bandit with 100-step episodes
    pub fn new() -> Self {
        Self::with_episode_length(100)
    }

    /// Create a bandit whose episodes end after `max_steps`
    pub fn with_episode_length(max_steps: usize) -> Self {
        Self { state: 0.0, steps: 0, max_steps, rng: StdRng::from_entropy() }
    }
}

impl Default for SimpleBandit {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimpleBandit {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.state = self.rng.gen_range(0..2) as f32;
        self.steps = 0;
        Ok(vec![self.state])
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let a = action.first().copied().ok_or_else(|| anyhow::anyhow!("empty action"))?;
        let distance = (a - self.state).abs();
        let reward = 1.0 - distance * distance;

        self.steps += 1;
        let done = self.steps >= self.max_steps;

        self.state = self.rng.gen_range(0..2) as f32;

        let mut result = StepResult::new(vec![self.state], reward, done);
        result.info.insert("distance".to_string(), vec![distance]);
        Ok(result)
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], space_type: SpaceType::Box { low: 0.0, high: 1.0 } }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], space_type: SpaceType::Box { low: -1.0, high: 2.0 } }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
