//! Generalized Advantage Estimation (GAE) computation
//!
//! This module computes advantages and returns for one path at a time.
//! Unlike a fixed-horizon rollout buffer, a path always ends at its last
//! recorded step, so the value after the final step is bootstrapped as `0`
//! whether the path terminated or was cut off by the length cap.

use super::special::discount_cumsum;

/// Advantages and returns for a single path
#[derive(Debug, Clone, PartialEq)]
pub struct PathAdvantages {
    /// GAE advantages `[T]`
    pub advantages: Vec<f32>,
    /// Discounted returns of the rewards passed in `[T]`
    pub returns: Vec<f32>,
}

/// Compute Generalized Advantage Estimation (GAE) for one path
///
/// # Arguments
/// * `rewards` - Rewards used for the TD residuals (possibly shaped) `[T]`
/// * `baselines` - Baseline predictions `[T]`
/// * `gamma` - Discount factor (0 <= gamma <= 1)
/// * `gae_lambda` - GAE lambda parameter (0 <= lambda <= 1)
///
/// # Mathematical Formula
/// ```text
/// b_T = 0
/// δ_t = r_t + γ * b_{t+1} - b_t
/// A_t = Σ_k (γλ)^k * δ_{t+k}
/// ```
///
/// With `λ = 1` this is the empirical return minus the baseline; with
/// `γ = 0` it is `r_t - b_t`.
pub fn compute_advantages(rewards: &[f32], baselines: &[f32], gamma: f64, gae_lambda: f64) -> Vec<f32> {
    debug_assert_eq!(rewards.len(), baselines.len(), "baseline length mismatch");

    let deltas: Vec<f32> = (0..rewards.len())
        .map(|t| {
            let next = baselines.get(t + 1).copied().unwrap_or(0.0) as f64;
            (rewards[t] as f64 + gamma * next - baselines[t] as f64) as f32
        })
        .collect();

    discount_cumsum(&deltas, gamma * gae_lambda)
}

/// Advantages from `shaped_rewards` and returns from `original_rewards`
///
/// Returns are always computed from the unshaped environment rewards so the
/// baseline keeps regressing on the task objective.
pub fn compute_path(
    shaped_rewards: &[f32],
    original_rewards: &[f32],
    baselines: &[f32],
    gamma: f64,
    gae_lambda: f64,
) -> PathAdvantages {
    PathAdvantages {
        advantages: compute_advantages(shaped_rewards, baselines, gamma, gae_lambda),
        returns: discount_cumsum(original_rewards, gamma),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REWARDS: [f32; 4] = [1.0, 0.5, -0.25, 2.0];
    const BASELINES: [f32; 4] = [0.8, 0.1, 0.4, -0.3];

    #[test]
    fn test_lambda_one_is_return_minus_baseline() {
        let gamma = 0.9;
        let adv = compute_advantages(&REWARDS, &BASELINES, gamma, 1.0);
        let returns = discount_cumsum(&REWARDS, gamma);

        for t in 0..REWARDS.len() {
            let expected = returns[t] - BASELINES[t];
            assert!((adv[t] - expected).abs() < 1e-5, "t={}: {} vs {}", t, adv[t], expected);
        }
    }

    #[test]
    fn test_gamma_zero_is_single_step() {
        let adv = compute_advantages(&REWARDS, &BASELINES, 0.0, 0.95);
        for t in 0..REWARDS.len() {
            assert_eq!(adv[t], REWARDS[t] - BASELINES[t]);
        }
    }

    #[test]
    fn test_last_step_bootstraps_zero() {
        // Even with a large baseline everywhere, the last residual sees b_T = 0
        let adv = compute_advantages(&[1.0, 1.0], &[5.0, 5.0], 0.99, 0.0);
        assert!((adv[0] - (1.0 + 0.99 * 5.0 - 5.0)).abs() < 1e-5);
        assert!((adv[1] - (1.0 - 5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_returns_use_original_rewards() {
        let out = compute_path(&[10.0, 10.0], &[1.0, 1.0], &[0.0, 0.0], 0.5, 1.0);
        assert_eq!(out.returns, vec![1.5, 1.0]);
        assert_eq!(out.advantages, vec![15.0, 10.0]);
    }

    #[test]
    fn test_empty_path() {
        assert!(compute_advantages(&[], &[], 0.99, 0.95).is_empty());
    }
}
