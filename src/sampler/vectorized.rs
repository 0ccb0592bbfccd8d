//! Lock-step rollouts over several environment copies
//!
//! One policy call per step serves every environment through
//! [`Policy::get_actions`]. When an environment finishes (termination or the
//! length cap) its path is closed, the environment is reset and the policy is
//! told which slots restarted through [`Policy::reset`]. Paths still in
//! progress when the target is met are dropped, so only whole paths are
//! returned. Environments that finish on the same step can overshoot a
//! [`SampleTarget::Paths`] count; the surplus whole paths are dropped too.

use super::{rollout::PathBuilder, RetryBudget, SampleTarget};
use crate::{
    buffer::Path,
    env::Environment,
    error::Result,
    policy::Policy,
};

fn reset_env<E: Environment>(env: &mut E, budget: &mut RetryBudget) -> Result<Vec<f32>> {
    loop {
        match env.reset() {
            Ok(observation) => return Ok(observation),
            Err(e) => budget.record(e)?,
        }
    }
}

/// Step `envs` in lock step until `target` is met
pub fn vectorized_rollouts<E, P>(
    envs: &mut [E],
    policy: &mut P,
    max_path_length: usize,
    target: SampleTarget,
    budget: &mut RetryBudget,
) -> Result<Vec<Path>>
where
    E: Environment,
    P: Policy + ?Sized,
{
    let n = envs.len();
    let mut paths = Vec::new();
    let mut samples = 0;
    if n == 0 || target.is_met(0, 0) {
        return Ok(paths);
    }

    let mut observations = Vec::with_capacity(n);
    for env in envs.iter_mut() {
        observations.push(reset_env(env, budget)?);
    }
    policy.reset(&vec![true; n]);
    let mut builders: Vec<PathBuilder> = (0..n).map(|_| PathBuilder::default()).collect();

    while !target.is_met(paths.len(), samples) {
        let (actions, agent_infos) = match policy.get_actions(&observations) {
            Ok(out) => out,
            Err(e) => {
                // Every in-progress path saw the failed call
                budget.record(e)?;
                for (i, env) in envs.iter_mut().enumerate() {
                    builders[i] = PathBuilder::default();
                    observations[i] = reset_env(env, budget)?;
                }
                policy.reset(&vec![true; n]);
                continue;
            }
        };

        let mut dones = vec![false; n];
        for (i, ((env, action), agent_info)) in envs.iter_mut().zip(actions).zip(agent_infos).enumerate() {
            match env.step(&action) {
                Ok(step) => {
                    let observation = std::mem::replace(&mut observations[i], step.observation.clone());
                    builders[i].push(observation, action, agent_info, &step);

                    if step.done || builders[i].len() >= max_path_length {
                        let builder = std::mem::take(&mut builders[i]);
                        let path = builder.finish(step.done)?;
                        samples += path.len();
                        paths.push(path);
                        dones[i] = true;
                        observations[i] = reset_env(env, budget)?;
                    }
                }
                Err(e) => {
                    budget.record(e)?;
                    builders[i] = PathBuilder::default();
                    dones[i] = true;
                    observations[i] = reset_env(env, budget)?;
                }
            }
        }

        if dones.iter().any(|&d| d) {
            policy.reset(&dones);
        }
    }

    if let SampleTarget::Paths(n) = target {
        paths.truncate(n);
    }
    Ok(paths)
}
