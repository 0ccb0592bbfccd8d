//! Policy interface
//!
//! Network architectures live outside this crate. The pipeline only needs a
//! policy that maps observations to actions, reports per-step diagnostics,
//! and exposes its parameters as a flat vector so workers can run an
//! identical snapshot.

use anyhow::Result;

use crate::buffer::{InfoDict, TensorDict};

/// Core trait for policies driven by the rollout collector
pub trait Policy {
    /// Current parameters as a flat vector
    fn get_param_values(&self) -> Vec<f32>;

    /// Load parameters from a flat vector of the same layout
    fn set_param_values(&mut self, params: &[f32]) -> Result<()>;

    /// Choose an action for a single observation
    fn get_action(&mut self, observation: &[f32]) -> Result<(Vec<f32>, InfoDict)>;

    /// Choose actions for a batch of observations
    ///
    /// The default implementation calls [`Policy::get_action`] per row.
    fn get_actions(&mut self, observations: &[Vec<f32>]) -> Result<(Vec<Vec<f32>>, Vec<InfoDict>)> {
        let mut actions = Vec::with_capacity(observations.len());
        let mut infos = Vec::with_capacity(observations.len());
        for obs in observations {
            let (action, info) = self.get_action(obs)?;
            actions.push(action);
            infos.push(info);
        }
        Ok((actions, infos))
    }

    /// Reset internal state for the entries whose `done` flag is set
    fn reset(&mut self, _dones: &[bool]) {}

    /// Whether the policy consumes whole sequences (padded batches)
    fn is_recurrent(&self) -> bool {
        false
    }

    /// Mean entropy of the action distribution described by `agent_infos`
    fn entropy(&self, _agent_infos: &TensorDict) -> Option<f64> {
        None
    }

    /// Reseed any sampling randomness
    fn seed(&mut self, _seed: u64) {}
}

/// Policy with a closed-form score function
///
/// Enough for likelihood-ratio gradient estimators that work directly on
/// the flat parameter vector.
pub trait DifferentiablePolicy: Policy {
    /// `log π(action | observation)`
    fn log_likelihood(&self, observation: &[f32], action: &[f32]) -> f32;

    /// `∇θ log π(action | observation)`, laid out like the parameter vector
    fn grad_log_likelihood(&self, observation: &[f32], action: &[f32]) -> Vec<f32>;
}

pub mod linear;
