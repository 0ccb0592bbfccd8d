//! Error taxonomy for the experience pipeline
//!
//! Collaborators (environments, policies, baselines, optimizers) report
//! failures as [`anyhow::Error`]; the pipeline itself classifies what went
//! wrong so callers can tell a bad call from a corrupted run.

/// Errors raised by the collection and processing pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A caller asked for something the current state cannot satisfy
    /// (sampling more transitions than stored, zero-length paths, ...)
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// An aggregated statistic was NaN or infinite
    #[error("non-finite value for `{key}`: {value}")]
    NonFinite {
        /// Tabular key that carried the value
        key: String,
        /// The offending value
        value: f64,
    },

    /// A rollout could not be completed within the retry budget
    #[error("rollout failed after {attempts} attempt(s): {source}")]
    Rollout {
        /// Number of attempts made, including the last one
        attempts: usize,
        /// Last error reported by the environment or policy
        #[source]
        source: anyhow::Error,
    },

    /// Settings that cannot work together
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure inside an external collaborator
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),

    /// Snapshot or config file I/O
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or config (de)serialization
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fail with [`PipelineError::NonFinite`] unless `value` is finite
pub fn ensure_finite(key: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipelineError::NonFinite { key: key.to_string(), value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite("AverageReturn", 1.5).unwrap(), 1.5);

        let err = ensure_finite("AverageReturn", f64::NAN).unwrap_err();
        assert!(matches!(err, PipelineError::NonFinite { ref key, .. } if key == "AverageReturn"));

        assert!(ensure_finite("MaxReturn", f64::INFINITY).is_err());
    }

    #[test]
    fn test_rollout_error_message() {
        let err = PipelineError::Rollout { attempts: 3, source: anyhow::anyhow!("physics exploded") };
        assert_eq!(err.to_string(), "rollout failed after 3 attempt(s): physics exploded");
    }
}
