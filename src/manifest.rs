//! Task manifest loading.
//!
//! The manifest is produced upstream and lists, in order, the tasks to run:
//!
//! ```toml
//! [[tasks]]
//! id = "t1"
//! name = "Refactor parser"
//! estimated_duration_ms = 120000
//! payload = "Instructions for the worker"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::GlobalConfig;
use crate::models::task::{validate_task_ids, CommandSpec, SessionTask};
use crate::{AppError, Result};

/// One task entry as written in the manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskEntry {
    /// Unique task id.
    pub id: String,
    /// Human-readable name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Priority hint.
    #[serde(default)]
    pub priority: u32,
    /// Estimated run time in milliseconds.
    pub estimated_duration_ms: u64,
    /// Content of the per-task input artifact.
    #[serde(default)]
    pub payload: String,
    /// Working directory; defaults to the current directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Overrides the configured worker executable.
    #[serde(default)]
    pub executable: Option<String>,
}

/// Ordered task list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskManifest {
    /// Task entries in run order.
    pub tasks: Vec<TaskEntry>,
}

impl TaskManifest {
    /// Load and validate a manifest from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read task manifest: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Build runnable tasks using the configured worker invocation.
    #[must_use]
    pub fn into_tasks(self, config: &GlobalConfig) -> Vec<SessionTask> {
        self.tasks
            .into_iter()
            .map(|entry| {
                let command = CommandSpec::new(
                    entry
                        .executable
                        .unwrap_or_else(|| config.worker.executable.clone()),
                    config.worker.args.clone(),
                    entry.working_dir.unwrap_or_else(|| PathBuf::from(".")),
                );
                let name = entry.name.unwrap_or_else(|| entry.id.clone());
                SessionTask::new(entry.id, name, command, entry.estimated_duration_ms)
                    .with_payload(entry.payload)
                    .with_priority(entry.priority)
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(AppError::Config("task manifest has no tasks".into()));
        }

        validate_task_ids(self.tasks.iter().map(|entry| entry.id.as_str()))
    }
}
