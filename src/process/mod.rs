//! Batch trajectory processing
//!
//! Turns one iteration's raw paths into training tensors:
//!
//! 1. optional reward normalization against moving mean/std queues
//! 2. optional intrinsic-reward shaping from per-step surprise
//! 3. per-path GAE advantages (shaped rewards) and discounted returns
//!    (original rewards) against the baseline's predictions
//! 4. flat or padded tensors with optional advantage centering/shifting
//! 5. batch diagnostics recorded to the [`LogContext`]
//!
//! The baseline is only read here; the training loop refits it on the
//! returned [`ProcessedPath`]s afterwards.

use serde::{Deserialize, Serialize};

use crate::{
    baseline::Baseline,
    buffer::{tensor::concat_tensor_dicts, Path},
    error::{PipelineError, Result},
    logger::LogContext,
    policy::Policy,
    utils::MovingStat,
};

pub mod gae;
pub mod intrinsic;
pub mod samples;
pub mod special;

pub use intrinsic::{IntrinsicConfig, KlNormalization, KlStats, SurpriseShaper, SurpriseTransform};
pub use samples::{BatchSummary, FlatBatch, PaddedBatch, SampleTensors, SamplesData};

const REWARD_EPS: f64 = 1e-8;

/// A path together with the fields derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPath {
    /// The path as collected; `path.rewards` are the original rewards
    pub path: Path,
    /// Rewards after normalization and intrinsic shaping `[T]`
    pub rewards: Vec<f32>,
    /// Discounted returns of the original rewards `[T]`
    pub returns: Vec<f32>,
    /// Raw GAE advantages `[T]`
    pub advantages: Vec<f32>,
    /// Baseline predictions used for the advantages `[T]`
    pub baselines: Vec<f32>,
}

/// Configuration for [`PathProcessor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Discount factor γ
    pub discount: f64,
    /// GAE λ
    pub gae_lambda: f64,
    /// Standardize advantages across the batch
    pub center_adv: bool,
    /// Shift advantages so the minimum is just above zero
    pub positive_adv: bool,
    /// Normalize rewards with moving mean/std queues
    pub normalize_reward: bool,
    /// Length of the moving statistic queues
    pub kl_q_len: usize,
    /// Intrinsic-reward shaping, when enabled
    pub intrinsic: Option<IntrinsicConfig>,
    /// Value written into padded slots for recurrent policies
    pub pad_value: f32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            discount: 0.99,
            gae_lambda: 1.0,
            center_adv: true,
            positive_adv: false,
            normalize_reward: false,
            kl_q_len: 10,
            intrinsic: None,
            pad_value: 0.0,
        }
    }
}

/// Stateful path processor
///
/// Holds the moving reward and surprise queues that persist across
/// iterations; it is only ever driven from the coordinating thread.
#[derive(Debug, Clone)]
pub struct PathProcessor {
    config: ProcessorConfig,
    reward_means: MovingStat,
    reward_stds: MovingStat,
    shaper: Option<SurpriseShaper>,
}

impl PathProcessor {
    /// Create a processor with empty moving statistics
    pub fn new(config: ProcessorConfig) -> Self {
        let q_len = config.kl_q_len.max(1);
        let shaper = config.intrinsic.map(|c| SurpriseShaper::new(c, q_len));
        Self {
            reward_means: MovingStat::new(q_len),
            reward_stds: MovingStat::new(q_len),
            shaper,
            config,
        }
    }

    /// Settings in use
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process one iteration's paths
    ///
    /// Surprise is shaped only when every path carries it; a batch where
    /// no path carries it records zeroed KL statistics. Mixing the two is a
    /// precondition violation.
    pub fn process_samples(
        &mut self,
        itr: usize,
        paths: Vec<Path>,
        baseline: &dyn Baseline,
        policy: &dyn Policy,
        log: &mut LogContext,
    ) -> Result<SamplesData> {
        if paths.is_empty() {
            return Err(PipelineError::Precondition("cannot process an empty batch".to_string()));
        }
        if let Some(i) = paths.iter().position(Path::is_empty) {
            return Err(PipelineError::Precondition(format!("path {} has zero length", i)));
        }

        let mut shaped: Vec<Vec<f32>> = paths.iter().map(|p| p.rewards.clone()).collect();
        if self.config.normalize_reward {
            self.normalize_rewards(&mut shaped);
        }

        let kl_stats = self.apply_intrinsic(&paths, &mut shaped, log)?;

        let mut processed = Vec::with_capacity(paths.len());
        for (path, rewards) in paths.into_iter().zip(shaped) {
            let baselines = baseline.predict(&path);
            if baselines.len() != path.len() {
                return Err(PipelineError::Precondition(format!(
                    "baseline predicted {} values for a path of length {}",
                    baselines.len(),
                    path.len()
                )));
            }
            let out = gae::compute_path(&rewards, &path.rewards, &baselines, self.config.discount, self.config.gae_lambda);
            processed.push(ProcessedPath {
                path,
                rewards,
                returns: out.returns,
                advantages: out.advantages,
                baselines,
            });
        }

        let tensors = if policy.is_recurrent() {
            SampleTensors::Padded(PaddedBatch::from_paths(
                &processed,
                self.config.center_adv,
                self.config.positive_adv,
                self.config.pad_value,
            )?)
        } else {
            SampleTensors::Flat(FlatBatch::from_paths(&processed, self.config.center_adv, self.config.positive_adv)?)
        };

        let agent_infos = concat_tensor_dicts(processed.iter().map(|p| &p.path.agent_infos))?;
        let summary = summarize(&processed, policy.entropy(&agent_infos));
        summary.record(itr, log);
        if let Some(shaper) = &self.shaper {
            log.record_tabular("Expl_eta", shaper.config().eta);
        }

        Ok(SamplesData { itr, tensors, paths: processed, summary, kl_stats })
    }

    fn normalize_rewards(&mut self, rewards: &mut [Vec<f32>]) {
        let flat = rewards.concat();
        self.reward_means.push(special::mean(&flat));
        self.reward_stds.push(special::std(&flat));

        let mean = self.reward_means.mean();
        let std = self.reward_stds.mean() + REWARD_EPS;
        for r in rewards.iter_mut().flatten() {
            *r = ((*r as f64 - mean) / std) as f32;
        }
    }

    fn apply_intrinsic(
        &mut self,
        paths: &[Path],
        rewards: &mut [Vec<f32>],
        log: &mut LogContext,
    ) -> Result<Option<KlStats>> {
        let Some(shaper) = &mut self.shaper else {
            return Ok(None);
        };

        let with_surprise = paths.iter().filter(|p| p.surprise.is_some()).count();
        if with_surprise == 0 {
            let stats = KlStats::default();
            stats.record(log);
            return Ok(Some(stats));
        }
        if with_surprise != paths.len() {
            return Err(PipelineError::Precondition(format!(
                "{} of {} paths carry surprise; shaping needs all or none",
                with_surprise,
                paths.len()
            )));
        }

        let mut surprise = Vec::with_capacity(paths.len());
        for (i, p) in paths.iter().enumerate() {
            let s = p.surprise.clone().unwrap_or_default();
            if s.len() != p.len() {
                return Err(PipelineError::Precondition(format!(
                    "path {} has {} surprise values for {} steps",
                    i,
                    s.len(),
                    p.len()
                )));
            }
            surprise.push(s);
        }

        let (bonus, stats) = shaper.shape(surprise);
        for (r, b) in rewards.iter_mut().zip(&bonus) {
            for (r, b) in r.iter_mut().zip(b) {
                *r += b;
            }
        }
        stats.record(log);
        Ok(Some(stats))
    }
}

fn summarize(paths: &[ProcessedPath], entropy: Option<f64>) -> BatchSummary {
    let returns: Vec<f32> = paths.iter().map(|p| p.path.undiscounted_return() as f32).collect();
    let all_rewards: Vec<f32> = paths.iter().flat_map(|p| p.path.rewards.iter().copied()).collect();
    let baselines: Vec<f32> = paths.iter().flat_map(|p| p.baselines.iter().copied()).collect();
    let discounted: Vec<f32> = paths.iter().flat_map(|p| p.returns.iter().copied()).collect();
    let per_path_mean: Vec<f32> = paths.iter().map(|p| special::mean(&p.path.rewards) as f32).collect();
    let first_returns: Vec<f32> = paths.iter().filter_map(|p| p.returns.first().copied()).collect();

    BatchSummary {
        average_reward: special::mean(&per_path_mean),
        min_reward: all_rewards.iter().copied().fold(f32::INFINITY, f32::min) as f64,
        max_reward: all_rewards.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64,
        average_discounted_return: special::mean(&first_returns),
        average_return: special::mean(&returns),
        std_return: special::std(&returns),
        max_return: returns.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64,
        min_return: returns.iter().copied().fold(f32::INFINITY, f32::min) as f64,
        explained_variance: special::explained_variance_1d(&baselines, &discounted),
        num_trajs: paths.len(),
        entropy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{baseline::ZeroBaseline, policy::linear::LinearGaussianPolicy};

    fn path(rewards: Vec<f32>) -> Path {
        let n = rewards.len();
        Path {
            observations: vec![vec![0.0]; n],
            actions: vec![vec![0.0]; n],
            rewards,
            agent_infos: [("log_std".to_string(), vec![vec![0.0]; n])].into(),
            ..Default::default()
        }
    }

    fn config() -> ProcessorConfig {
        ProcessorConfig { discount: 0.5, gae_lambda: 1.0, center_adv: false, ..Default::default() }
    }

    #[test]
    fn test_returns_and_summary() {
        let mut processor = PathProcessor::new(config());
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let data = processor
            .process_samples(0, vec![path(vec![1.0, 1.0]), path(vec![2.0])], &ZeroBaseline, &policy, &mut log)
            .unwrap();

        assert_eq!(data.paths[0].returns, vec![1.5, 1.0]);
        assert_eq!(data.paths[0].advantages, vec![1.5, 1.0]);
        assert_eq!(data.summary.num_trajs, 2);
        assert_eq!(data.summary.average_return, 2.0);
        assert_eq!(data.summary.max_reward, 2.0);
        assert_eq!(data.summary.min_reward, 1.0);
        assert_eq!(data.summary.average_discounted_return, 1.75);
        assert!(data.summary.entropy.is_some());
        assert!(data.tensors.as_flat().is_some());
        assert_eq!(log.get("NumTrajs"), Some(2.0));
        assert!(log.get("BNN_MeanKL").is_none());
    }

    #[test]
    fn test_rejects_empty_inputs() {
        let mut processor = PathProcessor::new(config());
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let err = processor.process_samples(0, vec![], &ZeroBaseline, &policy, &mut log).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));

        let err = processor
            .process_samples(0, vec![path(vec![1.0]), path(vec![])], &ZeroBaseline, &policy, &mut log)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }

    #[test]
    fn test_intrinsic_shapes_advantages_not_returns() {
        let mut cfg = config();
        cfg.discount = 0.0;
        cfg.intrinsic = Some(IntrinsicConfig { eta: 2.0, ..Default::default() });
        let mut processor = PathProcessor::new(cfg);
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let p = path(vec![1.0, 1.0]).with_surprise(vec![0.5, 5000.0]);
        let data = processor.process_samples(1, vec![p], &ZeroBaseline, &policy, &mut log).unwrap();

        assert_eq!(data.paths[0].returns, vec![1.0, 1.0]);
        assert_eq!(data.paths[0].advantages, vec![2.0, 10001.0]);
        assert_eq!(log.get("BNN_MaxKL"), Some(5000.0));
        assert_eq!(log.get("Expl_eta"), Some(2.0));
    }

    #[test]
    fn test_intrinsic_without_surprise_records_zeros() {
        let mut cfg = config();
        cfg.intrinsic = Some(IntrinsicConfig::default());
        let mut processor = PathProcessor::new(cfg);
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let data = processor.process_samples(0, vec![path(vec![1.0])], &ZeroBaseline, &policy, &mut log).unwrap();
        assert_eq!(data.kl_stats, Some(KlStats::default()));
        assert_eq!(log.get("BNN_MedianKL_transf"), Some(0.0));
    }

    #[test]
    fn test_mixed_surprise_is_rejected() {
        let mut cfg = config();
        cfg.intrinsic = Some(IntrinsicConfig::default());
        let mut processor = PathProcessor::new(cfg);
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let paths = vec![path(vec![1.0]).with_surprise(vec![1.0]), path(vec![1.0])];
        assert!(processor.process_samples(1, paths, &ZeroBaseline, &policy, &mut log).is_err());
    }

    #[test]
    fn test_reward_normalization_keeps_original_returns() {
        let mut cfg = config();
        cfg.normalize_reward = true;
        cfg.discount = 0.0;
        let mut processor = PathProcessor::new(cfg);
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut log = LogContext::new();

        let data = processor
            .process_samples(0, vec![path(vec![1.0, 3.0])], &ZeroBaseline, &policy, &mut log)
            .unwrap();

        // mean 2, std 1
        assert!((data.paths[0].rewards[0] + 1.0).abs() < 1e-6);
        assert!((data.paths[0].rewards[1] - 1.0).abs() < 1e-6);
        assert_eq!(data.paths[0].returns, vec![1.0, 3.0]);
        assert_eq!(data.summary.average_reward, 2.0);
    }

    #[test]
    fn test_recurrent_policy_gets_padded_batch() {
        struct Recurrent(LinearGaussianPolicy);
        impl Policy for Recurrent {
            fn get_param_values(&self) -> Vec<f32> {
                self.0.get_param_values()
            }
            fn set_param_values(&mut self, params: &[f32]) -> anyhow::Result<()> {
                self.0.set_param_values(params)
            }
            fn get_action(&mut self, obs: &[f32]) -> anyhow::Result<(Vec<f32>, crate::buffer::InfoDict)> {
                self.0.get_action(obs)
            }
            fn is_recurrent(&self) -> bool {
                true
            }
        }

        let mut processor = PathProcessor::new(config());
        let policy = Recurrent(LinearGaussianPolicy::new(1, 1, 0.0));
        let mut log = LogContext::new();
        let paths = vec![path(vec![1.0; 3]), path(vec![1.0; 5]), path(vec![1.0; 2])];

        let data = processor.process_samples(0, paths, &ZeroBaseline, &policy, &mut log).unwrap();
        let padded = data.tensors.as_padded().unwrap();
        assert_eq!(padded.max_path_length(), 5);
        assert_eq!(data.tensors.num_steps(), 10);
    }
}
