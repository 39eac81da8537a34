//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// External worker executable and its fixed argument prefix.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker binary (e.g., `claude`).
    pub executable: String,
    /// Mode flags passed before the per-task input and working directory.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Timeout guard settings (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Extra time added to each task's estimated duration.
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u64,
    /// Window between the graceful-stop and forceful-kill signals.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            buffer_ms: default_buffer_ms(),
            grace_ms: default_grace_ms(),
        }
    }
}

fn default_buffer_ms() -> u64 {
    60_000
}

fn default_grace_ms() -> u64 {
    5_000
}

/// Status reporting and completion polling intervals (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Period of the status monitor ticker.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Poll interval used while waiting for global completion.
    #[serde(default = "default_completion_poll_ms")]
    pub completion_poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
            completion_poll_ms: default_completion_poll_ms(),
        }
    }
}

fn default_status_interval_ms() -> u64 {
    30_000
}

fn default_completion_poll_ms() -> u64 {
    1_000
}

/// Locations for transient inputs, session logs, and the final report.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PathsConfig {
    /// Directory receiving materialized per-task input artifacts.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Directory receiving one append-only log per session.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Destination of the JSON execution report.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            log_dir: default_log_dir(),
            report_path: default_report_path(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".agent-batch/inputs")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".agent-batch/logs")
}

fn default_report_path() -> PathBuf {
    PathBuf::from(".agent-batch/reports/execution-report.json")
}

fn default_max_concurrent_sessions() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    2_000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Maximum sessions launched together in one batch.
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    /// Fixed delay between the settlement of one batch and the next launch.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Worker invocation settings.
    pub worker: WorkerConfig,
    /// Timeout guard settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Monitor and completion polling settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Delay inserted between consecutive batches.
    #[must_use]
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Guard buffer added to every task's estimated duration.
    #[must_use]
    pub fn timeout_buffer(&self) -> Duration {
        Duration::from_millis(self.timeouts.buffer_ms)
    }

    /// Grace window between graceful and forceful termination.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.timeouts.grace_ms)
    }

    /// Status monitor tick period.
    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.status_interval_ms)
    }

    /// Completion waiter poll interval.
    #[must_use]
    pub fn completion_poll(&self) -> Duration {
        Duration::from_millis(self.monitor.completion_poll_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "max_concurrent_sessions must be greater than zero".into(),
            ));
        }

        if self.worker.executable.trim().is_empty() {
            return Err(AppError::Config(
                "worker.executable must not be empty".into(),
            ));
        }

        if self.monitor.status_interval_ms == 0 || self.monitor.completion_poll_ms == 0 {
            return Err(AppError::Config(
                "monitor intervals must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
