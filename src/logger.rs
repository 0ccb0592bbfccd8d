//! Explicit logging context
//!
//! Components receive a `&mut LogContext` instead of writing to process-wide
//! state. Tabular values accumulate until [`LogContext::dump_tabular`], which
//! refuses to emit a non-finite value: a NaN in the iteration summary is
//! fatal to the run.
//!
//! Prefixes are scoped: [`LogContext::prefix`] (messages) and
//! [`LogContext::tabular_prefix`] (tabular keys) return a [`PrefixGuard`]
//! that pops the prefix when dropped, including on early return through `?`.
//!
//! # Example
//!
//! ```
//! use trajectory_rl::logger::LogContext;
//!
//! let mut log = LogContext::new();
//! {
//!     let mut scoped = log.tabular_prefix("Dyn");
//!     scoped.record_tabular("Loss", 0.5);
//! }
//! log.record_tabular("Iteration", 0.0);
//! assert_eq!(log.tabular()[0].0, "DynLoss");
//! assert_eq!(log.tabular()[1].0, "Iteration");
//! ```

use std::{
    collections::BTreeMap,
    fs,
    ops::{Deref, DerefMut},
    path::{Path as FsPath, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, Result};

/// Key/value mapping persisted per iteration
pub type Snapshot = BTreeMap<String, serde_json::Value>;

/// Which iteration snapshots are written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// One file per iteration (`itr_<n>.json`)
    All,
    /// Overwrite a single `params.json`
    #[default]
    Last,
    /// Never write snapshots
    None,
}

/// Explicit replacement for a global tabular logger
#[derive(Debug, Default)]
pub struct LogContext {
    prefixes: Vec<String>,
    tabular_prefixes: Vec<String>,
    tabular: Vec<(String, f64)>,
    snapshot_dir: Option<PathBuf>,
    snapshot_mode: SnapshotMode,
}

impl LogContext {
    /// Create a context that keeps tabular values in memory only
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist snapshots under `dir` according to `mode`
    pub fn with_snapshots(mut self, dir: impl Into<PathBuf>, mode: SnapshotMode) -> Self {
        self.snapshot_dir = Some(dir.into());
        self.snapshot_mode = mode;
        self
    }

    /// Snapshot directory, if configured
    pub fn snapshot_dir(&self) -> Option<&FsPath> {
        self.snapshot_dir.as_deref()
    }

    /// Record a scalar under the current tabular prefix
    ///
    /// A key recorded twice before a dump keeps the latest value.
    pub fn record_tabular(&mut self, key: &str, value: f64) {
        let key = format!("{}{}", self.tabular_prefixes.concat(), key);
        match self.tabular.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.tabular.push((key, value)),
        }
    }

    /// Emit a free-form message under the current message prefix
    pub fn log(&self, message: &str) {
        tracing::info!("{}{}", self.prefixes.concat(), message);
    }

    /// Push a message prefix for the lifetime of the returned guard
    pub fn prefix(&mut self, prefix: &str) -> PrefixGuard<'_> {
        self.prefixes.push(prefix.to_string());
        PrefixGuard { ctx: self, tabular: false }
    }

    /// Push a tabular-key prefix for the lifetime of the returned guard
    pub fn tabular_prefix(&mut self, prefix: &str) -> PrefixGuard<'_> {
        self.tabular_prefixes.push(prefix.to_string());
        PrefixGuard { ctx: self, tabular: true }
    }

    /// Values recorded since the last dump, in insertion order
    pub fn tabular(&self) -> &[(String, f64)] {
        &self.tabular
    }

    /// Look up a pending tabular value
    pub fn get(&self, key: &str) -> Option<f64> {
        self.tabular.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    /// Fail with [`crate::PipelineError::NonFinite`] on the first pending
    /// NaN or infinite value, leaving the table untouched
    pub fn check_tabular(&self) -> Result<()> {
        for (key, value) in &self.tabular {
            ensure_finite(key, *value)?;
        }
        Ok(())
    }

    /// Emit and clear the pending tabular values
    ///
    /// Fails with [`crate::PipelineError::NonFinite`] on the first NaN or
    /// infinite value; the table is cleared either way.
    pub fn dump_tabular(&mut self) -> Result<Vec<(String, f64)>> {
        let result = self.check_tabular();
        let rows = std::mem::take(&mut self.tabular);
        result?;

        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in &rows {
            tracing::info!("{:<width$} {:>14.6}", key, value, width = width);
        }
        Ok(rows)
    }

    /// Persist an iteration snapshot according to the snapshot mode
    ///
    /// Returns the written file, or `None` when snapshots are disabled.
    pub fn save_itr_params(&self, itr: usize, params: &Snapshot) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(None);
        };
        let file = match self.snapshot_mode {
            SnapshotMode::All => dir.join(format!("itr_{}.json", itr)),
            SnapshotMode::Last => dir.join("params.json"),
            SnapshotMode::None => return Ok(None),
        };

        fs::create_dir_all(dir)?;
        fs::write(&file, serde_json::to_vec_pretty(params)?)?;
        tracing::debug!("saved snapshot for iteration {} to {}", itr, file.display());
        Ok(Some(file))
    }
}

/// Scoped prefix; pops on drop
///
/// Derefs to the underlying [`LogContext`] so records made through the
/// guard carry the prefix.
#[derive(Debug)]
pub struct PrefixGuard<'a> {
    ctx: &'a mut LogContext,
    tabular: bool,
}

impl Deref for PrefixGuard<'_> {
    type Target = LogContext;

    fn deref(&self) -> &LogContext {
        self.ctx
    }
}

impl DerefMut for PrefixGuard<'_> {
    fn deref_mut(&mut self) -> &mut LogContext {
        self.ctx
    }
}

impl Drop for PrefixGuard<'_> {
    fn drop(&mut self) {
        if self.tabular {
            self.ctx.tabular_prefixes.pop();
        } else {
            self.ctx.prefixes.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;

    #[test]
    fn test_nested_prefixes_pop_in_order() {
        let mut log = LogContext::new();
        {
            let mut outer = log.tabular_prefix("Dyn");
            {
                let mut inner = outer.tabular_prefix("Model");
                inner.record_tabular("Loss", 1.0);
            }
            outer.record_tabular("Loss", 2.0);
        }
        log.record_tabular("Iteration", 3.0);

        let keys: Vec<&str> = log.tabular().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["DynModelLoss", "DynLoss", "Iteration"]);
    }

    #[test]
    fn test_message_prefix_leaves_keys_alone() {
        let mut log = LogContext::new();
        {
            let mut scoped = log.prefix("itr #0 | ");
            scoped.log("sampling");
            scoped.record_tabular("NumTrajs", 1.0);
        }
        assert_eq!(log.get("NumTrajs"), Some(1.0));
    }

    #[test]
    fn test_prefix_popped_on_early_return() {
        fn failing(log: &mut LogContext) -> Result<()> {
            let mut scoped = log.tabular_prefix("Dyn");
            scoped.record_tabular("Loss", 1.0);
            Err(PipelineError::Precondition("boom".to_string()))
        }

        let mut log = LogContext::new();
        assert!(failing(&mut log).is_err());
        log.record_tabular("After", 0.0);
        assert_eq!(log.get("After"), Some(0.0));
        assert_eq!(log.get("DynLoss"), Some(1.0));
    }

    #[test]
    fn test_record_overwrites_same_key() {
        let mut log = LogContext::new();
        log.record_tabular("A", 1.0);
        log.record_tabular("A", 2.0);
        assert_eq!(log.tabular(), &[("A".to_string(), 2.0)]);
    }

    #[test]
    fn test_dump_rejects_nan() {
        let mut log = LogContext::new();
        log.record_tabular("AverageReturn", 1.0);
        log.record_tabular("ExplainedVariance", f64::NAN);

        let err = log.dump_tabular().unwrap_err();
        assert!(matches!(err, PipelineError::NonFinite { ref key, .. } if key == "ExplainedVariance"));
        assert!(log.tabular().is_empty());
    }

    #[test]
    fn test_check_tabular_keeps_pending_rows() {
        let mut log = LogContext::new();
        log.record_tabular("GradNorm", f64::INFINITY);
        assert!(matches!(log.check_tabular(), Err(PipelineError::NonFinite { ref key, .. }) if key == "GradNorm"));
        assert_eq!(log.tabular().len(), 1);
    }

    #[test]
    fn test_dump_returns_rows_and_clears() {
        let mut log = LogContext::new();
        log.record_tabular("NumTrajs", 4.0);
        let rows = log.dump_tabular().unwrap();
        assert_eq!(rows, vec![("NumTrajs".to_string(), 4.0)]);
        assert!(log.tabular().is_empty());
    }

    #[test]
    fn test_snapshot_modes() {
        let dir = tempfile::tempdir().unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert("itr".to_string(), serde_json::json!(2));

        let all = LogContext::new().with_snapshots(dir.path(), SnapshotMode::All);
        let file = all.save_itr_params(2, &snapshot).unwrap().unwrap();
        assert!(file.ends_with("itr_2.json"));
        let loaded: Snapshot = serde_json::from_slice(&fs::read(&file).unwrap()).unwrap();
        assert_eq!(loaded["itr"], serde_json::json!(2));

        let last = LogContext::new().with_snapshots(dir.path(), SnapshotMode::Last);
        assert!(last.save_itr_params(5, &snapshot).unwrap().unwrap().ends_with("params.json"));

        let none = LogContext::new().with_snapshots(dir.path(), SnapshotMode::None);
        assert!(none.save_itr_params(5, &snapshot).unwrap().is_none());
        assert!(LogContext::new().save_itr_params(0, &snapshot).unwrap().is_none());
    }
}
