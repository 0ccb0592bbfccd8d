//! Training statistics
//!
//! This module defines structures for tracking and aggregating
//! per-iteration metrics across a training run.

use crate::process::SamplesData;

/// Statistics for a single training iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    /// Iteration index
    pub itr: usize,

    /// Number of paths collected
    pub num_trajs: usize,

    /// Number of environment steps collected
    pub num_samples: usize,

    /// Mean undiscounted return
    pub average_return: f64,

    /// Best undiscounted return in the batch
    pub max_return: f64,

    /// Worst undiscounted return in the batch
    pub min_return: f64,

    /// Baseline explained variance
    pub explained_variance: f64,
}

impl IterationStats {
    /// Extract statistics from processed samples
    pub fn from_samples(samples: &SamplesData) -> Self {
        Self {
            itr: samples.itr,
            num_trajs: samples.summary.num_trajs,
            num_samples: samples.paths.iter().map(|p| p.path.len()).sum(),
            average_return: samples.summary.average_return,
            max_return: samples.summary.max_return,
            min_return: samples.summary.min_return,
            explained_variance: samples.summary.explained_variance,
        }
    }
}

/// Aggregated statistics across a training run
///
/// Provides summary statistics and trends for monitoring training progress.
#[derive(Debug, Clone)]
pub struct AggregatedStats {
    /// Statistics from the latest iteration
    pub current: IterationStats,

    /// Exponential moving average of the average return
    pub running_avg_return: f64,

    /// Best average return seen so far
    pub best_average_return: f64,

    /// Number of iterations recorded
    pub iterations: usize,

    /// Total environment steps
    pub total_samples: usize,

    /// Undiscounted return of every episode so far
    pub episode_rewards: Vec<f64>,

    /// Length of every episode so far
    pub episode_lengths: Vec<usize>,
}

impl Default for AggregatedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedStats {
    /// Create empty aggregated statistics
    pub fn new() -> Self {
        Self {
            current: IterationStats::default(),
            running_avg_return: 0.0,
            best_average_return: f64::NEG_INFINITY,
            iterations: 0,
            total_samples: 0,
            episode_rewards: Vec::new(),
            episode_lengths: Vec::new(),
        }
    }

    /// Update with a processed batch
    pub fn update(&mut self, samples: &SamplesData) {
        let stats = IterationStats::from_samples(samples);

        // Exponential moving average with alpha = 0.1, seeded by the first value
        let alpha = 0.1;
        self.running_avg_return = if self.iterations == 0 {
            stats.average_return
        } else {
            alpha * stats.average_return + (1.0 - alpha) * self.running_avg_return
        };
        if stats.average_return > self.best_average_return {
            self.best_average_return = stats.average_return;
        }

        self.iterations += 1;
        self.total_samples += stats.num_samples;
        self.episode_rewards.extend(samples.episode_returns());
        self.episode_lengths.extend(samples.episode_lengths());
        self.current = stats;
    }

    /// Total number of episodes
    pub fn total_episodes(&self) -> usize {
        self.episode_lengths.len()
    }
}
