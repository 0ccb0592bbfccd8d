//! Single-environment rollouts

use anyhow::Result;

use crate::{
    buffer::{tensor::stack_info_dicts, InfoDict, Path},
    env::{Environment, StepResult},
    policy::Policy,
};

/// Accumulates the per-step records of one in-progress path
#[derive(Debug, Default)]
pub(crate) struct PathBuilder {
    observations: Vec<Vec<f32>>,
    actions: Vec<Vec<f32>>,
    rewards: Vec<f32>,
    env_infos: Vec<InfoDict>,
    agent_infos: Vec<InfoDict>,
}

impl PathBuilder {
    pub(crate) fn len(&self) -> usize {
        self.rewards.len()
    }

    pub(crate) fn push(&mut self, observation: Vec<f32>, action: Vec<f32>, agent_info: InfoDict, step: &StepResult) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(step.reward);
        self.env_infos.push(step.info.clone());
        self.agent_infos.push(agent_info);
    }

    pub(crate) fn finish(self, terminated: bool) -> Result<Path> {
        Ok(Path {
            observations: self.observations,
            actions: self.actions,
            rewards: self.rewards,
            env_infos: stack_info_dicts(&self.env_infos)?,
            agent_infos: stack_info_dicts(&self.agent_infos)?,
            terminated,
            surprise: None,
        })
    }
}

/// Run one episode until termination or `max_path_length` steps
///
/// Reaching the cap is not an error; the path is returned with
/// `terminated == false`.
pub fn rollout<E, P>(env: &mut E, policy: &mut P, max_path_length: usize) -> Result<Path>
where
    E: Environment + ?Sized,
    P: Policy + ?Sized,
{
    let mut observation = env.reset()?;
    policy.reset(&[true]);

    let mut builder = PathBuilder::default();
    while builder.len() < max_path_length {
        let (action, agent_info) = policy.get_action(&observation)?;
        let step = env.step(&action)?;
        let done = step.done;
        let next = step.observation.clone();
        builder.push(observation, action, agent_info, &step);
        if done {
            return builder.finish(true);
        }
        observation = next;
    }
    builder.finish(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{bimodal::BimodalEnv, simple_bandit::SimpleBandit},
        policy::linear::LinearGaussianPolicy,
    };

    #[test]
    fn test_rollout_stops_at_cap() {
        let mut env = SimpleBandit::with_episode_length(50);
        let mut policy = LinearGaussianPolicy::new(1, 1, 0.0);

        let path = rollout(&mut env, &mut policy, 10).unwrap();
        assert_eq!(path.len(), 10);
        assert!(!path.terminated);
        assert_eq!(path.observations.len(), 10);
        assert_eq!(path.agent_infos["mean"].len(), 10);
        assert_eq!(path.env_infos["distance"].len(), 10);
    }

    #[test]
    fn test_rollout_stops_at_termination() {
        let mut env = SimpleBandit::with_episode_length(4);
        let mut policy = LinearGaussianPolicy::new(1, 1, 0.0);

        let path = rollout(&mut env, &mut policy, 100).unwrap();
        assert_eq!(path.len(), 4);
        assert!(path.terminated);
    }

    #[test]
    fn test_single_step_env() {
        let mut env = BimodalEnv::new();
        let mut policy = LinearGaussianPolicy::new(1, 1, 0.0).deterministic(true);

        let path = rollout(&mut env, &mut policy, 100).unwrap();
        assert_eq!(path.len(), 1);
        assert!(path.terminated);
        assert_eq!(path.rewards[0], BimodalEnv::reward_at(0.0));
    }
}
