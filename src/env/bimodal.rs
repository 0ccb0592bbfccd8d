//! One-step bimodal reward landscape
//!
//! The agent starts at `x = 0` and takes a single displacement action. The
//! reward is a mixture of two Gaussian bumps centred at `+1` and `-1`, minus
//! a constant offset, so there are two equally good optima. Every episode
//! terminates after one step. Useful for exercising the cross-entropy method
//! on a problem where naive averaging of good candidates fails.

use anyhow::Result;

use super::{Environment, SpaceInfo, SpaceType, StepResult};

const MODE_DISTANCE: f32 = 1.0;
const BUMP_VARIANCE: f32 = 0.1;

/// Single-step environment with two reward modes
#[derive(Debug, Default)]
pub struct BimodalEnv {
    state: f32,
}

impl BimodalEnv {
    /// Create the environment at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Reward for ending up at position `x`
    pub fn reward_at(x: f32) -> f32 {
        let norm = 1.0 / (2.0 * (2.0 * std::f32::consts::PI * BUMP_VARIANCE).sqrt());
        let bump = |c: f32| (-0.5 / BUMP_VARIANCE * (x - c).powi(2)).exp();
        norm * (bump(MODE_DISTANCE) + bump(-MODE_DISTANCE)) - 0.5
    }
}

impl Environment for BimodalEnv {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.state = 0.0;
        Ok(vec![self.state])
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        let a = action.first().copied().ok_or_else(|| anyhow::anyhow!("empty action"))?;
        self.state += a.clamp(-5.0, 5.0);
        Ok(StepResult::new(vec![self.state], Self::reward_at(self.state), true))
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![1],
            space_type: SpaceType::Box { low: f32::NEG_INFINITY, high: f32::INFINITY },
        }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], space_type: SpaceType::Box { low: -5.0, high: 5.0 } }
    }
}
