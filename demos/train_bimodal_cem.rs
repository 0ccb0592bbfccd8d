//! Cross-entropy method on a one-step bimodal landscape
//!
//! Reward peaks at `x = -1` and `x = +1`. The search distribution starts
//! centred between the two modes with extra exploration noise that decays
//! over the first iterations; the elites should settle on one mode.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example train_bimodal_cem --release
//! ```

use anyhow::Result;
use trajectory_rl::{
    env::bimodal::BimodalEnv,
    prelude::*,
    train::ReturnEstimator,
};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    tracing::info!("BimodalEnv cross-entropy method");

    let mut policy = LinearGaussianPolicy::new(1, 1, 0.0).deterministic(true);
    let collector_config = CollectorConfig { n_parallel: 4, max_path_length: 1, seed: Some(7), ..Default::default() };
    let mut collector = RolloutCollector::new(BimodalEnv::new, &policy, collector_config)?;

    let config = CemConfig {
        n_itr: 30,
        n_samples: 50,
        best_frac: 0.1,
        init_std: 0.5,
        extra_std: 1.0,
        extra_decay_time: 10.0,
        seed: Some(7),
        ..Default::default()
    };
    let mut cem = Cem::new(config, &policy)?;
    let mut log = LogContext::new();
    cem.train(&mut collector, &mut policy, &mut log)?;

    let estimate = ReturnEstimator::Episodic { n_paths: 10, horizon: 1 }.estimate(BimodalEnv::new, &policy, 1, 0)?;

    tracing::info!("");
    tracing::info!("Final mean: {:?}", cem.mean());
    tracing::info!("Final std: {:?}", cem.std());
    tracing::info!("  Average return of best candidate: {:.4}", estimate.average_return);
    tracing::info!("  Reward at +1 (optimum): {:.4}", BimodalEnv::reward_at(1.0));
    Ok(())
}
