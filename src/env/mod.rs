//! Environment traits and implementations
//!
//! This module defines the environment interface the rollout collector
//! drives, plus two small reference environments used by tests and demos.
//! Environment dynamics are otherwise external to this crate.

use anyhow::Result;

use crate::buffer::InfoDict;

/// Core trait for RL environments
///
/// Observations and actions are flat `f32` vectors. Errors from `reset` or
/// `step` abort the current rollout; the collector decides whether to retry.
pub trait Environment {
    /// Reset the environment and return the initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Step the environment with an action
    fn step(&mut self, action: &[f32]) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;

    /// Reseed any internal randomness
    fn seed(&mut self, _seed: u64) {}
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated
    pub done: bool,

    /// Per-step diagnostics reported by the environment
    pub info: InfoDict,
}

impl StepResult {
    /// Step result with an empty info mapping
    pub fn new(observation: Vec<f32>, reward: f32, done: bool) -> Self {
        Self { observation, reward, done, info: InfoDict::new() }
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Kind of space
    pub space_type: SpaceType,
}

impl SpaceInfo {
    /// Flattened dimensionality
    pub fn flat_dim(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Bounded continuous space
    Box {
        /// Lower bound applied to every dimension
        low: f32,
        /// Upper bound applied to every dimension
        high: f32,
    },
}

pub mod bimodal;
pub mod simple_bandit;
