//! Batch training loop
//!
//! ```text
//! Init -> { Sample -> Process -> FitBaseline -> Optimize -> Log } x n_itr -> Shutdown
//! ```
//!
//! Each iteration snapshots the policy parameters, collects whole paths on
//! the worker pool, processes them into training tensors, refits the
//! baseline on the new batch and hands the batch to the policy optimizer.
//! A processed batch with a NaN or infinite summary value or advantage aborts
//! the run in the `Process` phase, before the baseline or policy sees it. The
//! `Log` phase checks the pending tabular values again before the snapshot
//! is written.
//!
//! With a replay pool configured, processed paths are also added to it and
//! an optional [`DynamicsModel`] is trained from normalized minibatches.
//! When intrinsic shaping is enabled, the model supplies per-step surprise
//! for every iteration after the first.

use rand::{rngs::StdRng, SeedableRng};
use serde_json::json;

use super::{
    config::{ReplayConfig, TrainConfig},
    optimizer::{DynamicsModel, PolicyOptimizer, SurpriseSettings},
    stats::{AggregatedStats, IterationStats},
};
use crate::{
    baseline::Baseline,
    buffer::{Path, ReplayBuffer},
    env::Environment,
    error::{PipelineError, Result},
    logger::{LogContext, Snapshot},
    policy::Policy,
    process::{PathProcessor, ProcessedPath, SamplesData},
    sampler::{RolloutCollector, SampleTarget},
};

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, no iteration run yet
    Init,
    /// Collecting paths
    Sample,
    /// Turning paths into tensors
    Process,
    /// Refitting the baseline
    FitBaseline,
    /// Updating the policy
    Optimize,
    /// Recording and snapshotting
    Log,
    /// All iterations done
    Shutdown,
}

/// Replay pool plus the model it feeds
struct ReplayState {
    buffer: ReplayBuffer,
    config: ReplayConfig,
    model: Option<Box<dyn DynamicsModel>>,
    kl_factor: f64,
}

impl ReplayState {
    fn add_paths(&mut self, paths: &[ProcessedPath]) {
        for processed in paths {
            let path = &processed.path;
            let last = path.len().saturating_sub(1);
            for t in 0..path.len() {
                self.buffer.add(&path.observations[t], &path.actions[t], path.rewards[t], t == last);
            }
        }
    }

    fn update_model(&mut self, rng: &mut StdRng, log: &mut LogContext) -> Result<()> {
        let Some(model) = self.model.as_mut() else {
            return Ok(());
        };
        if self.buffer.len() < self.config.min_pool_size {
            return Ok(());
        }

        let stats = self.buffer.stats();
        let mut batches = Vec::with_capacity(self.config.updates_per_iteration());
        for _ in 0..self.config.updates_per_iteration() {
            batches.push(self.buffer.sample_batch(self.config.pool_batch_size, rng)?.normalized(&stats));
        }
        if batches.is_empty() {
            return Ok(());
        }

        let mut before = 0.0;
        for batch in &batches {
            before += model.loss(batch)?;
        }
        for batch in &batches {
            model.train_batch(batch, self.kl_factor)?;
        }
        let mut after = 0.0;
        for batch in &batches {
            after += model.loss(batch)?;
        }

        self.kl_factor *= self.config.replay_kl_schedule;
        log.record_tabular("KLFactor", self.kl_factor);
        log.record_tabular("DynModelSqLossBefore", before / batches.len() as f64);
        log.record_tabular("DynModelSqLossAfter", after / batches.len() as f64);
        Ok(())
    }

    fn surprise(&self, path: &Path, settings: SurpriseSettings) -> Result<Option<Vec<f32>>> {
        let Some(model) = self.model.as_ref() else {
            return Ok(None);
        };
        let stats = (!self.buffer.is_empty()).then(|| self.buffer.stats());
        Ok(Some(model.surprise(path, stats.as_ref(), settings)?))
    }
}

/// Orchestrates sampling, processing, baseline fitting and optimization
pub struct TrainingLoop<E, P, B, O> {
    config: TrainConfig,
    collector: RolloutCollector<E, P>,
    processor: PathProcessor,
    policy: P,
    baseline: B,
    optimizer: O,
    replay: Option<ReplayState>,
    log: LogContext,
    stats: AggregatedStats,
    phase: Phase,
    rng: StdRng,
}

impl<E, P, B, O> TrainingLoop<E, P, B, O>
where
    E: Environment + Send,
    P: Policy + Clone + Send,
    B: Baseline,
    O: PolicyOptimizer<P>,
{
    /// Build the loop
    ///
    /// Configuration problems are reported here as
    /// [`PipelineError::Config`], before any environment is stepped.
    pub fn new<F>(env_fn: F, policy: P, baseline: B, optimizer: O, config: TrainConfig) -> Result<Self>
    where
        F: Fn() -> E,
    {
        config.validate()?;

        let probe = env_fn();
        let obs_dim = probe.observation_space().flat_dim();
        let act_dim = probe.action_space().flat_dim();

        let collector = RolloutCollector::new(&env_fn, &policy, config.collector_config())?;
        let processor = PathProcessor::new(config.processor_config());
        let replay = match &config.replay {
            Some(replay) => Some(ReplayState {
                buffer: ReplayBuffer::new(replay.pool_size, obs_dim, act_dim)?,
                config: replay.clone(),
                model: None,
                kl_factor: 1.0,
            }),
            None => None,
        };

        let mut log = LogContext::new();
        if let Some(dir) = &config.snapshot_dir {
            log = log.with_snapshots(dir, config.snapshot_mode);
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::debug!("training loop ready: obs_dim={}, act_dim={}", obs_dim, act_dim);
        Ok(Self {
            config,
            collector,
            processor,
            policy,
            baseline,
            optimizer,
            replay,
            log,
            stats: AggregatedStats::new(),
            phase: Phase::Init,
            rng,
        })
    }

    /// Attach a dynamics model fed from the replay pool
    pub fn with_dynamics_model(mut self, model: impl DynamicsModel + 'static) -> Result<Self> {
        match self.replay.as_mut() {
            Some(replay) => {
                replay.model = Some(Box::new(model));
                Ok(self)
            }
            None => Err(PipelineError::Config("a dynamics model needs a replay pool".to_string())),
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Policy being trained
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Settings
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Logging context (pending tabular values, snapshot settings)
    pub fn log(&self) -> &LogContext {
        &self.log
    }

    /// Statistics aggregated over completed iterations
    pub fn stats(&self) -> &AggregatedStats {
        &self.stats
    }

    /// Transitions currently held by the replay pool
    pub fn replay_len(&self) -> Option<usize> {
        self.replay.as_ref().map(|r| r.buffer.len())
    }

    /// Run iterations `start_itr..n_itr`
    pub fn train(&mut self) -> Result<AggregatedStats> {
        tracing::info!("training iterations {}..{}", self.config.start_itr, self.config.n_itr);
        for itr in self.config.start_itr..self.config.n_itr {
            self.step(itr)?;
        }
        self.enter(Phase::Shutdown);
        Ok(self.stats.clone())
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run one iteration
    pub fn step(&mut self, itr: usize) -> Result<IterationStats> {
        self.enter(Phase::Sample);
        let params = self.policy.get_param_values();
        let mut paths = self.collector.obtain_samples(&params, SampleTarget::Samples(self.config.batch_size))?;
        self.attach_surprise(itr, &mut paths)?;

        self.enter(Phase::Process);
        let samples = {
            let mut log = self.log.prefix(&format!("itr #{} | ", itr));
            log.log("processing samples");
            let samples = self.processor.process_samples(itr, paths, &self.baseline, &self.policy, &mut log)?;
            samples.check_finite()?;
            if let Some(replay) = self.replay.as_mut() {
                replay.add_paths(&samples.paths);
                replay.update_model(&mut self.rng, &mut log)?;
            }
            samples
        };

        self.enter(Phase::FitBaseline);
        self.baseline.fit(&samples.paths)?;

        self.enter(Phase::Optimize);
        self.optimizer.optimize_policy(itr, &mut self.policy, &samples, &mut self.log)?;

        self.enter(Phase::Log);
        self.stats.update(&samples);
        let snapshot = self.snapshot(itr, &samples)?;
        let mut log = self.log.prefix(&format!("itr #{} | ", itr));
        log.check_tabular()?;
        log.save_itr_params(itr, &snapshot)?;
        log.log("saved");
        log.dump_tabular()?;

        Ok(self.stats.current.clone())
    }

    fn attach_surprise(&self, itr: usize, paths: &mut [Path]) -> Result<()> {
        if self.config.intrinsic.is_none() || itr <= self.config.start_itr {
            return Ok(());
        }
        let Some(replay) = &self.replay else {
            return Ok(());
        };
        let settings = SurpriseSettings {
            n_itr_update: self.config.n_itr_update,
            second_order_update: self.config.second_order_update,
        };
        for path in paths.iter_mut() {
            if let Some(surprise) = replay.surprise(path, settings)? {
                path.surprise = Some(surprise);
            }
        }
        Ok(())
    }

    fn snapshot(&self, itr: usize, samples: &SamplesData) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        snapshot.insert("itr".to_string(), json!(itr));
        snapshot.insert("policy_params".to_string(), json!(self.policy.get_param_values()));
        snapshot.insert("episode_rewards".to_string(), json!(self.stats.episode_rewards));
        snapshot.insert("episode_lengths".to_string(), json!(self.stats.episode_lengths));
        if self.config.store_paths {
            snapshot.insert("paths".to_string(), serde_json::to_value(&samples.paths)?);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        baseline::{LinearFeatureBaseline, ZeroBaseline},
        env::{bimodal::BimodalEnv, simple_bandit::SimpleBandit},
        logger::SnapshotMode,
        policy::linear::LinearGaussianPolicy,
        process::IntrinsicConfig,
        train::{dynamics::LinearDynamicsModel, vpg::VanillaPolicyGradient},
    };

    fn bandit_config() -> TrainConfig {
        TrainConfig::new().n_itr(3).batch_size(40).max_path_length(10).seed(0)
    }

    #[test]
    fn test_train_runs_all_phases() {
        let policy = LinearGaussianPolicy::new(1, 1, 0.0);
        let mut training = TrainingLoop::new(
            || SimpleBandit::with_episode_length(10),
            policy,
            LinearFeatureBaseline::default(),
            VanillaPolicyGradient::new(0.05),
            bandit_config(),
        )
        .unwrap();
        assert_eq!(training.phase(), Phase::Init);

        let stats = training.train().unwrap();
        assert_eq!(training.phase(), Phase::Shutdown);
        assert_eq!(stats.iterations, 3);
        assert!(stats.total_samples >= 120);
        assert_eq!(stats.total_episodes(), stats.episode_lengths.len());
        assert!(training.log().tabular().is_empty());
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let config = TrainConfig { second_order_update: true, n_itr_update: 3, ..bandit_config() };
        let result = TrainingLoop::new(
            SimpleBandit::new,
            LinearGaussianPolicy::new(1, 1, 0.0),
            ZeroBaseline,
            VanillaPolicyGradient::new(0.1),
            config,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_dynamics_model_requires_replay() {
        let training = TrainingLoop::new(
            SimpleBandit::new,
            LinearGaussianPolicy::new(1, 1, 0.0),
            ZeroBaseline,
            VanillaPolicyGradient::new(0.1),
            bandit_config(),
        )
        .unwrap();
        let result = training.with_dynamics_model(LinearDynamicsModel::new(1, 1, 0.01));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_replay_and_surprise_pipeline() {
        let replay = ReplayConfig {
            pool_size: 100,
            min_pool_size: 30,
            n_updates_per_sample: 40,
            pool_batch_size: 10,
            replay_kl_schedule: 0.5,
        };
        let config = bandit_config().replay(replay).intrinsic(IntrinsicConfig { eta: 0.1, ..Default::default() });
        let mut training = TrainingLoop::new(
            || SimpleBandit::with_episode_length(10),
            LinearGaussianPolicy::new(1, 1, 0.0),
            ZeroBaseline,
            VanillaPolicyGradient::new(0.01),
            config,
        )
        .unwrap()
        .with_dynamics_model(LinearDynamicsModel::new(1, 1, 0.01))
        .unwrap();

        // First iteration: no surprise yet, pool reaches min size
        training.step(0).unwrap();
        assert_eq!(training.replay_len(), Some(40));

        training.step(1).unwrap();
        assert_eq!(training.replay_len(), Some(80));
        assert_eq!(training.stats().iterations, 2);
    }

    #[test]
    fn test_snapshots_written_per_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig { store_paths: true, ..bandit_config().n_itr(2) }.snapshots(dir.path(), SnapshotMode::All);
        let mut training = TrainingLoop::new(
            BimodalEnv::new,
            LinearGaussianPolicy::new(1, 1, 0.0),
            ZeroBaseline,
            VanillaPolicyGradient::new(0.1),
            config,
        )
        .unwrap();
        training.train().unwrap();

        for itr in 0..2 {
            let text = std::fs::read_to_string(dir.path().join(format!("itr_{}.json", itr))).unwrap();
            let snapshot: Snapshot = serde_json::from_str(&text).unwrap();
            assert_eq!(snapshot["itr"], json!(itr));
            assert_eq!(snapshot["policy_params"].as_array().unwrap().len(), 3);
            // Episode history accumulates across iterations
            assert_eq!(snapshot["episode_lengths"].as_array().unwrap().len(), 40 * (itr + 1));
            assert_eq!(snapshot["episode_rewards"].as_array().unwrap().len(), 40 * (itr + 1));
            assert!(snapshot.contains_key("paths"));
        }
    }
}
