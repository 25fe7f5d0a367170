use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::worker_pool::PoolConfig;
use crate::session::session_store::SessionStore;
use crate::shared::constants::{
    DEFAULT_CHUNK_LENGTH_SECS, DEFAULT_CHUNK_RETRIES, DEFAULT_CHUNK_TIMEOUT_SECS,
    DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_DURATION_THRESHOLD_SECS, DEFAULT_EXTRACT_CONCURRENCY,
    DEFAULT_MODEL_LOAD_RETRIES, DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SESSION_TTL_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS, MAX_DURATION_SECS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be {expected}, got {value}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("could not determine a session root; set session_root")]
    NoSessionRoot,
}

/// What to hand back when the session deadline passes with only some chunks done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialPolicy {
    /// Fail the request.
    #[default]
    FailClosed,
    /// Return what completed, flagged `partial` with the missing chunks listed.
    BestEffort,
}

impl std::fmt::Display for PartialPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartialPolicy::FailClosed => write!(f, "fail-closed"),
            PartialPolicy::BestEffort => write!(f, "best-effort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub worker_count: usize,
    /// Live workers below this count mark the pool degraded. `None` means
    /// any lost worker degrades it.
    pub min_healthy_workers: Option<usize>,
    pub model_load_retries: u32,
    pub chunk_length_secs: f64,
    pub duration_threshold_secs: f64,
    pub chunk_timeout_secs: f64,
    pub session_timeout_secs: f64,
    pub chunk_retries: u32,
    pub extract_concurrency: usize,
    pub session_ttl_secs: f64,
    pub sweep_interval_secs: f64,
    pub drain_timeout_secs: f64,
    pub partial_policy: PartialPolicy,
    pub session_root: Option<PathBuf>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            min_healthy_workers: None,
            model_load_retries: DEFAULT_MODEL_LOAD_RETRIES,
            chunk_length_secs: DEFAULT_CHUNK_LENGTH_SECS,
            duration_threshold_secs: DEFAULT_DURATION_THRESHOLD_SECS,
            chunk_timeout_secs: DEFAULT_CHUNK_TIMEOUT_SECS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            chunk_retries: DEFAULT_CHUNK_RETRIES,
            extract_concurrency: DEFAULT_EXTRACT_CONCURRENCY,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            partial_policy: PartialPolicy::default(),
            session_root: None,
        }
    }
}

/// Half the available cores, at least one. Each worker holds a full model.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

impl TranscriptionConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(invalid("worker_count", "at least 1", self.worker_count));
        }
        if let Some(min) = self.min_healthy_workers {
            if min == 0 || min > self.worker_count {
                return Err(invalid(
                    "min_healthy_workers",
                    "between 1 and worker_count",
                    min,
                ));
            }
        }
        if self.extract_concurrency == 0 {
            return Err(invalid("extract_concurrency", "at least 1", self.extract_concurrency));
        }

        let durations = [
            ("chunk_length_secs", self.chunk_length_secs),
            ("chunk_timeout_secs", self.chunk_timeout_secs),
            ("session_timeout_secs", self.session_timeout_secs),
            ("session_ttl_secs", self.session_ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (field, value) in durations {
            if !value.is_finite() || value <= 0.0 || value > MAX_DURATION_SECS {
                return Err(invalid(field, "a positive number of seconds up to 30 days", value));
            }
        }
        for (field, value) in [
            ("duration_threshold_secs", self.duration_threshold_secs),
            ("drain_timeout_secs", self.drain_timeout_secs),
        ] {
            if !value.is_finite() || value < 0.0 || value > MAX_DURATION_SECS {
                return Err(invalid(field, "zero or more seconds up to 30 days", value));
            }
        }
        // A live session must never look abandoned to the sweeper
        if self.session_ttl_secs <= self.session_timeout_secs {
            return Err(invalid(
                "session_ttl_secs",
                "greater than session_timeout_secs",
                self.session_ttl_secs,
            ));
        }
        Ok(())
    }

    pub fn session_root(&self) -> Result<PathBuf, ConfigError> {
        self.session_root
            .clone()
            .or_else(SessionStore::default_root)
            .ok_or(ConfigError::NoSessionRoot)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            worker_count: self.worker_count,
            min_healthy_workers: self.min_healthy_workers,
            load_retries: self.model_load_retries,
        }
    }

    pub fn chunk_timeout(&self) -> Duration {
        secs(self.chunk_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        secs(self.session_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        secs(self.sweep_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        secs(self.drain_timeout_secs)
    }
}

fn invalid(field: &'static str, expected: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        field,
        expected,
        value: value.to_string(),
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = TranscriptionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count >= 1);
        assert_eq!(config.partial_policy, PartialPolicy::FailClosed);
    }

    #[test]
    fn test_load_fills_missing_fields_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "worker_count": 3, "chunk_length_secs": 60.0, "partial_policy": "best_effort" }"#,
        )
        .unwrap();

        let config = TranscriptionConfig::load(&path).unwrap();
        assert_eq!(config.worker_count, 3);
        assert_relative_eq!(config.chunk_length_secs, 60.0);
        assert_eq!(config.partial_policy, PartialPolicy::BestEffort);
        assert_relative_eq!(config.duration_threshold_secs, DEFAULT_DURATION_THRESHOLD_SECS);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TranscriptionConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ worker_count: ").unwrap();
        let err = TranscriptionConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[rstest]
    #[case::zero_workers(|c: &mut TranscriptionConfig| c.worker_count = 0, "worker_count")]
    #[case::min_above_count(|c: &mut TranscriptionConfig| c.min_healthy_workers = Some(99), "min_healthy_workers")]
    #[case::zero_chunk_length(|c: &mut TranscriptionConfig| c.chunk_length_secs = 0.0, "chunk_length_secs")]
    #[case::nan_timeout(|c: &mut TranscriptionConfig| c.chunk_timeout_secs = f64::NAN, "chunk_timeout_secs")]
    #[case::negative_threshold(|c: &mut TranscriptionConfig| c.duration_threshold_secs = -1.0, "duration_threshold_secs")]
    #[case::huge_session_timeout(|c: &mut TranscriptionConfig| c.session_timeout_secs = 1e30, "session_timeout_secs")]
    #[case::huge_drain_timeout(|c: &mut TranscriptionConfig| c.drain_timeout_secs = 9e18, "drain_timeout_secs")]
    #[case::ttl_not_above_timeout(|c: &mut TranscriptionConfig| c.session_ttl_secs = c.session_timeout_secs, "session_ttl_secs")]
    fn test_validate_rejects(#[case] tweak: fn(&mut TranscriptionConfig), #[case] field: &str) {
        let mut config = TranscriptionConfig::default();
        tweak(&mut config);
        match config.validate() {
            Err(ConfigError::Invalid { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected Invalid({field}), got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_session_root_wins() {
        let config = TranscriptionConfig {
            session_root: Some(PathBuf::from("/srv/sessions")),
            ..Default::default()
        };
        assert_eq!(config.session_root().unwrap(), PathBuf::from("/srv/sessions"));
    }

    #[test]
    fn test_duration_helpers() {
        let config = TranscriptionConfig {
            chunk_timeout_secs: 1.5,
            ..Default::default()
        };
        assert_eq!(config.chunk_timeout(), Duration::from_millis(1500));
        assert_eq!(config.pool_config().worker_count, config.worker_count);
    }
}
