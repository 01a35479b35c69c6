use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::common::error::{PipelineError, Result};

/// Application-level settings, read from `config.toml` next to the binary.
/// Per-source request policy lives in the registry documents instead.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Maximum connectors fetching concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Overall run deadline. On expiry, in-flight fetches are abandoned
    /// and the run reports partial results.
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,
    /// Minimum interval between fetches of the same source.
    #[serde(default = "default_min_fetch_interval_secs")]
    pub min_fetch_interval_secs: i64,
    /// Directory for cadence markers and other run metadata.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_run_deadline_secs() -> u64 {
    300
}
fn default_min_fetch_interval_secs() -> i64 {
    12 * 60 * 60
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            run_deadline_secs: default_run_deadline_secs(),
            min_fetch_interval_secs: default_min_fetch_interval_secs(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load `config.toml`, falling back to defaults when the file is
    /// absent. A present but unparsable file is an error.
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        match fs::read_to_string(config_path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("failed to parse '{config_path}': {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PipelineError::Config(format!(
                "failed to read '{config_path}': {e}"
            ))),
        }
    }
}
