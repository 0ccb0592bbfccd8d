//! Train a linear Gaussian policy on SimpleBandit with vanilla policy gradient
//!
//! SimpleBandit rewards `1 - (action - state)^2`, so the optimal linear
//! policy is `action = state` (weight 1, bias 0). The average reward should
//! climb toward 1 as the log-std shrinks.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example train_bandit_vpg --release
//! ```

use anyhow::Result;
use trajectory_rl::{
    env::simple_bandit::SimpleBandit,
    logger::SnapshotMode,
    prelude::*,
};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    tracing::info!("SimpleBandit vanilla policy gradient");

    let config = TrainConfig::new()
        .n_itr(50)
        .batch_size(2000)
        .max_path_length(100)
        .discount(0.0) // rewards are independent per step
        .gae_lambda(0.0)
        .n_parallel(4)
        .seed(42)
        .snapshots("runs/bandit_vpg", SnapshotMode::Last);

    let policy = LinearGaussianPolicy::new(1, 1, 0.0);
    let mut training = TrainingLoop::new(
        || SimpleBandit::with_episode_length(100),
        policy,
        LinearFeatureBaseline::default(),
        VanillaPolicyGradient::new(0.05).max_grad_norm(1.0),
        config,
    )?;

    let stats = training.train()?;

    tracing::info!("");
    tracing::info!("Finished {} iterations, {} samples", stats.iterations, stats.total_samples);
    tracing::info!("  Best average return: {:.3}", stats.best_average_return);
    tracing::info!("  Final parameters: {:?}", training.policy().get_param_values());
    Ok(())
}
