//! Cross-entropy method over the policy parameter vector
//!
//! Keeps a diagonal Gaussian `N(mean, std²)` over parameters. Every
//! iteration samples candidates, rolls each out once, keeps the top
//! `best_frac` by discounted return and refits the Gaussian to them. An
//! extra exploration variance `extra_std²` is added to the sampling
//! distribution and decays linearly to zero over `extra_decay_time`
//! iterations:
//!
//! ```text
//! sample_std = sqrt(std² + extra_std² · max(1 - itr / extra_decay_time, 0))
//! ```
//!
//! The best candidate of each iteration is loaded into the policy.

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    buffer::Path,
    env::Environment,
    error::{PipelineError, Result},
    logger::{LogContext, Snapshot},
    policy::Policy,
    process::special::{discount_cumsum, mean, std},
    sampler::RolloutCollector,
};

/// Cross-entropy method settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CemConfig {
    /// Number of iterations
    pub n_itr: usize,

    /// Discount used for candidate fitness
    pub discount: f64,

    /// Initial standard deviation of every parameter
    pub init_std: f64,

    /// Extra exploration standard deviation
    pub extra_std: f64,

    /// Iterations over which the extra std decays to zero
    pub extra_decay_time: f64,

    /// Candidates per iteration
    pub n_samples: usize,

    /// When set, sample candidates until their paths hold this many steps
    pub batch_size: Option<usize>,

    /// Fraction of candidates kept as elites
    pub best_frac: f64,

    /// Seed for candidate sampling
    pub seed: Option<u64>,
}

impl Default for CemConfig {
    fn default() -> Self {
        Self {
            n_itr: 500,
            discount: 0.99,
            init_std: 1.0,
            extra_std: 1.0,
            extra_decay_time: 100.0,
            n_samples: 100,
            batch_size: None,
            best_frac: 0.05,
            seed: None,
        }
    }
}

impl CemConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 && self.batch_size.is_none() {
            return Err(PipelineError::Config("n_samples must be > 0".to_string()));
        }
        if self.batch_size == Some(0) {
            return Err(PipelineError::Config("batch_size must be > 0".to_string()));
        }
        if !(self.best_frac > 0.0 && self.best_frac <= 1.0) {
            return Err(PipelineError::Config("best_frac must be in (0, 1]".to_string()));
        }
        if self.init_std < 0.0 || self.extra_std < 0.0 {
            return Err(PipelineError::Config("standard deviations must be non-negative".to_string()));
        }
        if self.extra_decay_time <= 0.0 {
            return Err(PipelineError::Config("extra_decay_time must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(PipelineError::Config("discount must be in [0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Cross-entropy optimizer state
#[derive(Debug)]
pub struct Cem {
    config: CemConfig,
    cur_mean: Vec<f64>,
    cur_std: Vec<f64>,
    rng: StdRng,
}

impl Cem {
    /// Start the search at the policy's current parameters
    pub fn new<P: Policy + ?Sized>(config: CemConfig, policy: &P) -> Result<Self> {
        config.validate()?;
        let cur_mean: Vec<f64> = policy.get_param_values().iter().map(|&p| p as f64).collect();
        let cur_std = vec![config.init_std; cur_mean.len()];
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, cur_mean, cur_std, rng })
    }

    /// Settings
    pub fn config(&self) -> &CemConfig {
        &self.config
    }

    /// Current mean of the search distribution
    pub fn mean(&self) -> &[f64] {
        &self.cur_mean
    }

    /// Current standard deviation of the search distribution
    pub fn std(&self) -> &[f64] {
        &self.cur_std
    }

    fn sample_candidates(&mut self, n: usize, sample_std: &[f64]) -> Vec<Vec<f32>> {
        (0..n)
            .map(|_| {
                self.cur_mean
                    .iter()
                    .zip(sample_std)
                    .map(|(m, s)| {
                        let eps: f64 = StandardNormal.sample(&mut self.rng);
                        (m + s * eps) as f32
                    })
                    .collect()
            })
            .collect()
    }

    /// Run one iteration, recording diagnostics into `log`
    ///
    /// Returns the evaluated paths in candidate order.
    pub fn step<E, P>(
        &mut self,
        itr: usize,
        collector: &mut RolloutCollector<E, P>,
        policy: &mut P,
        log: &mut LogContext,
    ) -> Result<Vec<Path>>
    where
        E: Environment + Send,
        P: Policy + Clone + Send,
    {
        let extra_var_mult = (1.0 - itr as f64 / self.config.extra_decay_time).max(0.0);
        let sample_std: Vec<f64> = self
            .cur_std
            .iter()
            .map(|s| (s * s + self.config.extra_std.powi(2) * extra_var_mult).sqrt())
            .collect();

        let (candidates, paths) = match self.config.batch_size {
            None => {
                let candidates = self.sample_candidates(self.config.n_samples, &sample_std);
                let paths = collector.evaluate_params(&candidates)?;
                (candidates, paths)
            }
            Some(batch_size) => {
                let chunk = collector.n_workers() * 2;
                let mut candidates = Vec::new();
                let mut paths: Vec<Path> = Vec::new();
                let mut samples = 0;
                while samples < batch_size {
                    let chunk_candidates = self.sample_candidates(chunk, &sample_std);
                    let chunk_paths = collector.evaluate_params(&chunk_candidates)?;
                    samples += chunk_paths.iter().map(Path::len).sum::<usize>();
                    candidates.extend(chunk_candidates);
                    paths.extend(chunk_paths);
                }
                (candidates, paths)
            }
        };

        let fitness: Vec<f64> = paths
            .iter()
            .map(|p| discount_cumsum(&p.rewards, self.config.discount).first().map_or(0.0, |&r| r as f64))
            .collect();

        let n_best = ((candidates.len() as f64 * self.config.best_frac) as usize).max(1);
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]));
        let elites: Vec<&Vec<f32>> = order[..n_best].iter().map(|&i| &candidates[i]).collect();

        for (d, (m, s)) in self.cur_mean.iter_mut().zip(self.cur_std.iter_mut()).enumerate() {
            let column: Vec<f32> = elites.iter().map(|x| x[d]).collect();
            *m = mean(&column);
            *s = std(&column);
        }
        policy.set_param_values(elites[0])?;

        let undiscounted: Vec<f32> = paths.iter().map(|p| p.undiscounted_return() as f32).collect();
        let lengths: Vec<f32> = paths.iter().map(|p| p.len() as f32).collect();
        let fitness_f32: Vec<f32> = fitness.iter().map(|&f| f as f32).collect();

        log.record_tabular("Iteration", itr as f64);
        log.record_tabular("CurStdMean", self.cur_std.iter().sum::<f64>() / self.cur_std.len().max(1) as f64);
        log.record_tabular("AverageReturn", mean(&undiscounted));
        log.record_tabular("StdReturn", std(&undiscounted));
        log.record_tabular("MaxReturn", undiscounted.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64);
        log.record_tabular("MinReturn", undiscounted.iter().copied().fold(f32::INFINITY, f32::min) as f64);
        log.record_tabular("AverageDiscountedReturn", mean(&fitness_f32));
        log.record_tabular("AvgTrajLen", mean(&lengths));
        log.record_tabular("NumTrajs", paths.len() as f64);

        Ok(paths)
    }

    /// Run all iterations, snapshotting and dumping the table after each
    pub fn train<E, P>(
        &mut self,
        collector: &mut RolloutCollector<E, P>,
        policy: &mut P,
        log: &mut LogContext,
    ) -> Result<()>
    where
        E: Environment + Send,
        P: Policy + Clone + Send,
    {
        for itr in 0..self.config.n_itr {
            let mut scoped = log.prefix(&format!("itr #{} | ", itr));
            self.step(itr, collector, policy, &mut scoped)?;

            let mut snapshot = Snapshot::new();
            snapshot.insert("itr".to_string(), json!(itr));
            snapshot.insert("cur_mean".to_string(), json!(self.cur_mean));
            snapshot.insert("cur_std".to_string(), json!(self.cur_std));
            snapshot.insert("policy_params".to_string(), json!(policy.get_param_values()));
            scoped.save_itr_params(itr, &snapshot)?;

            scoped.log("saved");
            scoped.dump_tabular()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{env::bimodal::BimodalEnv, policy::linear::LinearGaussianPolicy, sampler::CollectorConfig};

    fn setup(n_parallel: usize) -> (RolloutCollector<BimodalEnv, LinearGaussianPolicy>, LinearGaussianPolicy) {
        let policy = LinearGaussianPolicy::new(1, 1, 0.0).deterministic(true);
        let config = CollectorConfig { n_parallel, max_path_length: 5, ..Default::default() };
        let collector = RolloutCollector::new(BimodalEnv::new, &policy, config).unwrap();
        (collector, policy)
    }

    #[test]
    fn test_cem_finds_a_mode() {
        let (mut collector, mut policy) = setup(2);
        let config = CemConfig {
            n_itr: 8,
            n_samples: 20,
            best_frac: 0.2,
            extra_std: 0.0,
            seed: Some(0),
            ..Default::default()
        };
        let mut cem = Cem::new(config, &policy).unwrap();
        let mut log = LogContext::new();
        cem.train(&mut collector, &mut policy, &mut log).unwrap();

        let x = policy.get_param_values()[1];
        assert!(BimodalEnv::reward_at(x) > -0.3, "best bias {} is far from a mode", x);
    }

    #[test]
    fn test_step_records_diagnostics() {
        let (mut collector, mut policy) = setup(1);
        let config = CemConfig { n_samples: 10, best_frac: 0.3, seed: Some(4), ..Default::default() };
        let mut cem = Cem::new(config, &policy).unwrap();
        let mut log = LogContext::new();

        let paths = cem.step(0, &mut collector, &mut policy, &mut log).unwrap();
        assert_eq!(paths.len(), 10);
        assert_eq!(log.get("NumTrajs"), Some(10.0));
        assert_eq!(log.get("AvgTrajLen"), Some(1.0));
        assert!(log.get("MaxReturn").unwrap() >= log.get("AverageReturn").unwrap());
        assert!(log.get("StdReturn").unwrap() >= 0.0);
        assert!(log.get("CurStdMean").is_some());

        // The loaded policy is the fittest candidate
        let best = paths.iter().map(|p| p.rewards[0]).fold(f32::NEG_INFINITY, f32::max);
        let x = policy.get_param_values()[1];
        assert!((BimodalEnv::reward_at(x) - best).abs() < 1e-5);
    }

    #[test]
    fn test_batch_size_mode_samples_in_chunks() {
        let (mut collector, mut policy) = setup(1);
        let config = CemConfig { batch_size: Some(9), seed: Some(1), ..Default::default() };
        let mut cem = Cem::new(config, &policy).unwrap();
        let mut log = LogContext::new();

        // One-step paths, chunks of 2 candidates: 10 candidates reach 9 steps
        let paths = cem.step(0, &mut collector, &mut policy, &mut log).unwrap();
        assert_eq!(paths.len(), 10);
        assert_eq!(log.get("NumTrajs"), Some(10.0));
    }

    #[test]
    fn test_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let (mut collector, mut policy) = setup(1);
        let config = CemConfig { n_itr: 2, n_samples: 4, best_frac: 0.5, seed: Some(2), ..Default::default() };
        let mut cem = Cem::new(config, &policy).unwrap();
        let mut log = LogContext::new().with_snapshots(dir.path(), crate::logger::SnapshotMode::All);
        cem.train(&mut collector, &mut policy, &mut log).unwrap();

        let text = std::fs::read_to_string(dir.path().join("itr_1.json")).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(snapshot["itr"], json!(1));
        assert_eq!(snapshot["cur_std"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_config() {
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let config = CemConfig { best_frac: 0.0, ..Default::default() };
        assert!(matches!(Cem::new(config, &policy), Err(PipelineError::Config(_))));
    }
}
