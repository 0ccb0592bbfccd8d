//! Training tensors assembled from processed paths
//!
//! Feed-forward policies train on a flat layout where every path's steps are
//! concatenated. Recurrent policies need whole sequences, so every field is
//! right-padded to the longest path in the batch and paired with a validity
//! mask.

use std::collections::BTreeMap;

use super::{
    intrinsic::KlStats,
    special::{center, shift_to_positive},
    ProcessedPath,
};
use crate::{
    buffer::{
        tensor::{
            concat_rows, concat_scalars, concat_tensor_dicts, pad_rows, pad_scalars, pad_tensor_dict,
            stack_padded_dicts,
        },
        TensorDict,
    },
    error::{ensure_finite, Result},
    logger::LogContext,
};

const ADV_EPS: f64 = 1e-8;

/// Padded per-key diagnostics: `[P][T_max][D]`
pub type PaddedTensorDict = BTreeMap<String, Vec<Vec<Vec<f32>>>>;

/// Flat layout: `[N][D]` with `N` the total number of steps
#[derive(Debug, Clone, Default)]
pub struct FlatBatch {
    /// Observations `[N][obs_dim]`
    pub observations: Vec<Vec<f32>>,
    /// Actions `[N][act_dim]`
    pub actions: Vec<Vec<f32>>,
    /// Shaped rewards `[N]`
    pub rewards: Vec<f32>,
    /// Advantages after optional centering/shifting `[N]`
    pub advantages: Vec<f32>,
    /// Environment diagnostics `[N][D]`
    pub env_infos: TensorDict,
    /// Policy diagnostics `[N][D]`
    pub agent_infos: TensorDict,
}

/// Padded layout: `[P][T_max][D]` plus a `[P][T_max]` validity mask
#[derive(Debug, Clone, Default)]
pub struct PaddedBatch {
    /// Observations `[P][T_max][obs_dim]`
    pub observations: Vec<Vec<Vec<f32>>>,
    /// Actions `[P][T_max][act_dim]`
    pub actions: Vec<Vec<Vec<f32>>>,
    /// Shaped rewards `[P][T_max]`
    pub rewards: Vec<Vec<f32>>,
    /// Advantages after optional centering/shifting `[P][T_max]`
    pub advantages: Vec<Vec<f32>>,
    /// `true` where a step exists `[P][T_max]`
    pub valids: Vec<Vec<bool>>,
    /// Environment diagnostics
    pub env_infos: PaddedTensorDict,
    /// Policy diagnostics
    pub agent_infos: PaddedTensorDict,
}

/// Batch tensors in the layout the policy consumes
#[derive(Debug, Clone)]
pub enum SampleTensors {
    /// Concatenated steps for feed-forward policies
    Flat(FlatBatch),
    /// Right-padded sequences for recurrent policies
    Padded(PaddedBatch),
}

impl SampleTensors {
    /// Number of real (unpadded) steps
    pub fn num_steps(&self) -> usize {
        match self {
            SampleTensors::Flat(b) => b.advantages.len(),
            SampleTensors::Padded(b) => b.valids.iter().flatten().filter(|&&v| v).count(),
        }
    }

    /// Flat layout, if that is what was built
    pub fn as_flat(&self) -> Option<&FlatBatch> {
        match self {
            SampleTensors::Flat(b) => Some(b),
            SampleTensors::Padded(_) => None,
        }
    }

    /// Padded layout, if that is what was built
    pub fn as_padded(&self) -> Option<&PaddedBatch> {
        match self {
            SampleTensors::Padded(b) => Some(b),
            SampleTensors::Flat(_) => None,
        }
    }
}

/// Center and/or shift advantages across the whole batch, returned per path
///
/// Statistics are taken over real steps only; centering runs before the
/// shift.
pub fn normalize_advantages(paths: &[ProcessedPath], center_adv: bool, positive_adv: bool) -> Vec<Vec<f32>> {
    let mut flat = concat_scalars(paths.iter().map(|p| p.advantages.as_slice()));
    if center_adv {
        center(&mut flat, ADV_EPS);
    }
    if positive_adv {
        shift_to_positive(&mut flat, ADV_EPS);
    }

    let mut out = Vec::with_capacity(paths.len());
    let mut offset = 0;
    for p in paths {
        out.push(flat[offset..offset + p.advantages.len()].to_vec());
        offset += p.advantages.len();
    }
    out
}

impl FlatBatch {
    /// Concatenate processed paths
    pub fn from_paths(paths: &[ProcessedPath], center_adv: bool, positive_adv: bool) -> Result<Self> {
        let advantages = normalize_advantages(paths, center_adv, positive_adv);
        Ok(Self {
            observations: concat_rows(paths.iter().map(|p| p.path.observations.as_slice())),
            actions: concat_rows(paths.iter().map(|p| p.path.actions.as_slice())),
            rewards: concat_scalars(paths.iter().map(|p| p.rewards.as_slice())),
            advantages: advantages.concat(),
            env_infos: concat_tensor_dicts(paths.iter().map(|p| &p.path.env_infos))?,
            agent_infos: concat_tensor_dicts(paths.iter().map(|p| &p.path.agent_infos))?,
        })
    }
}

impl PaddedBatch {
    /// Right-pad processed paths to the longest one with `pad`
    pub fn from_paths(paths: &[ProcessedPath], center_adv: bool, positive_adv: bool, pad: f32) -> Result<Self> {
        let max_len = paths.iter().map(|p| p.path.len()).max().unwrap_or(0);
        let advantages = normalize_advantages(paths, center_adv, positive_adv);

        let env_infos: Vec<TensorDict> =
            paths.iter().map(|p| pad_tensor_dict(&p.path.env_infos, max_len, pad)).collect();
        let agent_infos: Vec<TensorDict> =
            paths.iter().map(|p| pad_tensor_dict(&p.path.agent_infos, max_len, pad)).collect();

        Ok(Self {
            observations: paths.iter().map(|p| pad_rows(&p.path.observations, max_len, pad)).collect(),
            actions: paths.iter().map(|p| pad_rows(&p.path.actions, max_len, pad)).collect(),
            rewards: paths.iter().map(|p| pad_scalars(&p.rewards, max_len, pad)).collect(),
            advantages: advantages.iter().map(|a| pad_scalars(a, max_len, pad)).collect(),
            valids: paths
                .iter()
                .map(|p| (0..max_len).map(|t| t < p.path.len()).collect())
                .collect(),
            env_infos: stack_padded_dicts(&env_infos)?,
            agent_infos: stack_padded_dicts(&agent_infos)?,
        })
    }

    /// Common time dimension
    pub fn max_path_length(&self) -> usize {
        self.valids.first().map_or(0, Vec::len)
    }
}

/// Per-iteration batch diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// Mean over paths of the per-path mean raw reward
    pub average_reward: f64,
    /// Smallest raw reward in the batch
    pub min_reward: f64,
    /// Largest raw reward in the batch
    pub max_reward: f64,
    /// Mean discounted return from the first step
    pub average_discounted_return: f64,
    /// Mean undiscounted return
    pub average_return: f64,
    /// Population std of undiscounted returns
    pub std_return: f64,
    /// Largest undiscounted return
    pub max_return: f64,
    /// Smallest undiscounted return
    pub min_return: f64,
    /// Baseline explained variance against the returns
    pub explained_variance: f64,
    /// Number of paths
    pub num_trajs: usize,
    /// Mean policy entropy, when the policy reports one
    pub entropy: Option<f64>,
}

impl BatchSummary {
    /// Record the summary under the standard tabular keys
    pub fn record(&self, itr: usize, log: &mut LogContext) {
        log.record_tabular("Iteration", itr as f64);
        log.record_tabular("AverageReward", self.average_reward);
        log.record_tabular("MinReward", self.min_reward);
        log.record_tabular("MaxReward", self.max_reward);
        log.record_tabular("AverageDiscountedReturn", self.average_discounted_return);
        log.record_tabular("AverageReturn", self.average_return);
        log.record_tabular("ExplainedVariance", self.explained_variance);
        log.record_tabular("NumTrajs", self.num_trajs as f64);
        if let Some(entropy) = self.entropy {
            log.record_tabular("Entropy", entropy);
            log.record_tabular("Perplexity", entropy.exp());
        }
        log.record_tabular("StdReturn", self.std_return);
        log.record_tabular("MaxReturn", self.max_return);
        log.record_tabular("MinReturn", self.min_return);
    }

    /// Fail on the first NaN or infinite summary value, in tabular-key order
    pub fn check_finite(&self) -> Result<()> {
        for (key, value) in [
            ("AverageReward", self.average_reward),
            ("MinReward", self.min_reward),
            ("MaxReward", self.max_reward),
            ("AverageDiscountedReturn", self.average_discounted_return),
            ("AverageReturn", self.average_return),
            ("ExplainedVariance", self.explained_variance),
        ] {
            ensure_finite(key, value)?;
        }
        if let Some(entropy) = self.entropy {
            ensure_finite("Entropy", entropy)?;
        }
        for (key, value) in [("StdReturn", self.std_return), ("MaxReturn", self.max_return), ("MinReturn", self.min_return)] {
            ensure_finite(key, value)?;
        }
        Ok(())
    }
}

/// Everything the optimizer and baseline need from one iteration
#[derive(Debug, Clone)]
pub struct SamplesData {
    /// Iteration that produced the batch
    pub itr: usize,
    /// Training tensors
    pub tensors: SampleTensors,
    /// Paths with their derived fields
    pub paths: Vec<ProcessedPath>,
    /// Batch diagnostics
    pub summary: BatchSummary,
    /// Surprise statistics, when intrinsic shaping ran
    pub kl_stats: Option<KlStats>,
}

impl SamplesData {
    /// Undiscounted raw return of every path
    pub fn episode_returns(&self) -> Vec<f64> {
        self.paths.iter().map(|p| p.path.undiscounted_return()).collect()
    }

    /// Length of every path
    pub fn episode_lengths(&self) -> Vec<usize> {
        self.paths.iter().map(|p| p.path.len()).collect()
    }

    /// Reject a batch whose summary or real-step advantages are not finite
    ///
    /// Padding is ignored.
    pub fn check_finite(&self) -> Result<()> {
        self.summary.check_finite()?;
        let bad = match &self.tensors {
            SampleTensors::Flat(b) => b.advantages.iter().copied().find(|a| !a.is_finite()),
            SampleTensors::Padded(b) => b
                .advantages
                .iter()
                .zip(&b.valids)
                .flat_map(|(advs, valid)| advs.iter().zip(valid))
                .find(|&(a, &v)| v && !a.is_finite())
                .map(|(a, _)| *a),
        };
        match bad {
            Some(a) => ensure_finite("Advantages", a as f64).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::Path, error::PipelineError};

    fn processed(len: usize, advantage: f32) -> ProcessedPath {
        let path = Path {
            observations: (0..len).map(|t| vec![t as f32, 1.0]).collect(),
            actions: vec![vec![0.5]; len],
            rewards: vec![1.0; len],
            env_infos: [("x".to_string(), vec![vec![2.0]; len])].into(),
            agent_infos: [("log_std".to_string(), vec![vec![0.0]; len])].into(),
            terminated: true,
            surprise: None,
        };
        ProcessedPath {
            path,
            rewards: vec![1.0; len],
            returns: vec![1.0; len],
            advantages: vec![advantage; len],
            baselines: vec![0.0; len],
        }
    }

    #[test]
    fn test_padding_shapes_and_mask() {
        let paths = vec![processed(3, 1.0), processed(5, 2.0), processed(2, 3.0)];
        let batch = PaddedBatch::from_paths(&paths, false, false, 0.0).unwrap();

        assert_eq!(batch.max_path_length(), 5);
        assert_eq!(batch.observations.len(), 3);
        assert!(batch.observations.iter().all(|p| p.len() == 5 && p[4].len() == 2));
        assert!(batch.rewards.iter().all(|r| r.len() == 5));
        assert_eq!(batch.valids.iter().flatten().filter(|&&v| v).count(), 10);
        assert_eq!(batch.valids[2], vec![true, true, false, false, false]);
        assert_eq!(batch.advantages[0], vec![1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(batch.agent_infos["log_std"].len(), 3);
        assert_eq!(batch.env_infos["x"][0][4], vec![0.0]);

        assert_eq!(SampleTensors::Padded(batch).num_steps(), 10);
    }

    #[test]
    fn test_flat_concatenates() {
        let paths = vec![processed(3, 1.0), processed(2, 3.0)];
        let batch = FlatBatch::from_paths(&paths, false, false).unwrap();
        assert_eq!(batch.observations.len(), 5);
        assert_eq!(batch.advantages, vec![1.0, 1.0, 1.0, 3.0, 3.0]);
        assert_eq!(batch.env_infos["x"].len(), 5);
    }

    #[test]
    fn test_center_and_shift_ignore_padding() {
        let mut a = processed(2, 0.0);
        a.advantages = vec![-2.0, -1.0];
        let mut b = processed(3, 0.0);
        b.advantages = vec![0.0, 1.0, 2.0];

        let batch = PaddedBatch::from_paths(&[a, b], true, true, -7.0).unwrap();
        let valid: Vec<f32> = batch.advantages[0][..2].iter().chain(&batch.advantages[1]).copied().collect();
        assert!(valid.iter().all(|&x| x >= 0.0));
        assert_eq!(batch.advantages[0][2], -7.0);
    }

    #[test]
    fn test_summary_records_entropy_only_when_present() {
        let mut log = LogContext::new();
        BatchSummary::default().record(0, &mut log);
        assert!(log.get("Entropy").is_none());

        let summary = BatchSummary { entropy: Some(0.0), ..Default::default() };
        summary.record(1, &mut log);
        assert_eq!(log.get("Perplexity"), Some(1.0));
        assert_eq!(log.get("Iteration"), Some(1.0));
    }

    fn samples_data(tensors: SampleTensors, summary: BatchSummary) -> SamplesData {
        SamplesData { itr: 0, tensors, paths: Vec::new(), summary, kl_stats: None }
    }

    #[test]
    fn test_check_finite_reports_first_bad_summary_key() {
        let summary = BatchSummary { average_reward: f64::NAN, min_return: f64::INFINITY, ..Default::default() };
        let err = summary.check_finite().unwrap_err();
        assert!(matches!(err, PipelineError::NonFinite { ref key, .. } if key == "AverageReward"));
        assert!(BatchSummary::default().check_finite().is_ok());
    }

    #[test]
    fn test_check_finite_covers_advantages_but_not_padding() {
        let paths = vec![processed(3, 1.0), processed(1, 2.0)];
        let padded = PaddedBatch::from_paths(&paths, false, false, f32::NAN).unwrap();
        assert!(samples_data(SampleTensors::Padded(padded), BatchSummary::default()).check_finite().is_ok());

        let flat = FlatBatch::from_paths(&[processed(2, f32::NAN)], false, false).unwrap();
        let err = samples_data(SampleTensors::Flat(flat), BatchSummary::default()).check_finite().unwrap_err();
        assert!(matches!(err, PipelineError::NonFinite { ref key, .. } if key == "Advantages"));
    }
}
