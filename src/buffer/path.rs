//! Trajectories produced by a single rollout

use serde::{Deserialize, Serialize};

use super::tensor::TensorDict;

/// One rollout from reset to termination or the path-length cap
///
/// Paths are produced by the sampler and never edited in place afterwards;
/// processing wraps them in [`crate::process::ProcessedPath`] together with
/// the derived fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Path {
    /// Observations seen before each action: `[T][obs_dim]`
    pub observations: Vec<Vec<f32>>,

    /// Actions taken: `[T][act_dim]`
    pub actions: Vec<Vec<f32>>,

    /// Raw environment rewards: `[T]`
    pub rewards: Vec<f32>,

    /// Environment diagnostics per step
    pub env_infos: TensorDict,

    /// Policy diagnostics per step (distribution parameters, ...)
    pub agent_infos: TensorDict,

    /// Whether the environment signalled termination on the last step.
    /// `false` means the path was cut off by `max_path_length`.
    pub terminated: bool,

    /// Externally supplied per-step surprise (e.g. dynamics-model KL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surprise: Option<Vec<f32>>,
}

impl Path {
    /// Number of steps in the path
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Check if the path has no steps
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Sum of raw rewards
    pub fn undiscounted_return(&self) -> f64 {
        self.rewards.iter().map(|&r| r as f64).sum()
    }

    /// Attach a surprise signal, returning the extended path
    pub fn with_surprise(mut self, surprise: Vec<f32>) -> Self {
        self.surprise = Some(surprise);
        self
    }

    /// Keep only the first `len` steps
    ///
    /// A truncated path never counts as terminated.
    pub fn truncated(&self, len: usize) -> Self {
        let len = len.min(self.len());
        let cut = |dict: &TensorDict| -> TensorDict {
            dict.iter().map(|(k, rows)| (k.clone(), rows[..len].to_vec())).collect()
        };
        Self {
            observations: self.observations[..len].to_vec(),
            actions: self.actions[..len].to_vec(),
            rewards: self.rewards[..len].to_vec(),
            env_infos: cut(&self.env_infos),
            agent_infos: cut(&self.agent_infos),
            terminated: self.terminated && len == self.len(),
            surprise: self.surprise.as_ref().map(|s| s[..len].to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(len: usize) -> Path {
        Path {
            observations: (0..len).map(|t| vec![t as f32]).collect(),
            actions: (0..len).map(|_| vec![0.0]).collect(),
            rewards: vec![1.0; len],
            env_infos: [("x".to_string(), (0..len).map(|t| vec![t as f32]).collect())].into(),
            agent_infos: TensorDict::new(),
            terminated: true,
            surprise: Some(vec![0.5; len]),
        }
    }

    #[test]
    fn test_truncated_path() {
        let p = path(5);
        let cut = p.truncated(3);

        assert_eq!(cut.len(), 3);
        assert_eq!(cut.observations[2], vec![2.0]);
        assert_eq!(cut.env_infos["x"].len(), 3);
        assert_eq!(cut.surprise.as_ref().map(Vec::len), Some(3));
        assert!(!cut.terminated);

        // Truncating to the full length keeps the terminal flag
        assert!(p.truncated(5).terminated);
    }

    #[test]
    fn test_undiscounted_return() {
        assert_eq!(path(4).undiscounted_return(), 4.0);
        assert!(Path::default().is_empty());
    }
}
