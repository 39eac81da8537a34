//! Immutable description of one unit of work.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// How to invoke the external worker for a task.
///
/// The final argv is `executable`, the fixed `args` prefix, the per-task
/// input artifact path, and the working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandSpec {
    /// Worker binary.
    pub executable: String,
    /// Constant mode flags placed before the per-task arguments.
    pub args: Vec<String>,
    /// Directory the worker operates in.
    pub working_dir: PathBuf,
}

impl CommandSpec {
    /// Construct a command specification.
    #[must_use]
    pub fn new(executable: impl Into<String>, args: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            executable: executable.into(),
            args,
            working_dir,
        }
    }

    /// Render the full argument list for the given input artifact.
    #[must_use]
    pub fn render_args(&self, input: &Path) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(input.to_string_lossy().into_owned());
        argv.push(self.working_dir.to_string_lossy().into_owned());
        argv
    }
}

/// One unit of work handed to a worker session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionTask {
    /// Unique identifier; keys the session registry.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Worker invocation.
    pub command: CommandSpec,
    /// Priority hint. Carried through but not consulted for ordering.
    pub priority: u32,
    /// Expected run time; the timeout guard adds its buffer on top.
    pub estimated_duration_ms: u64,
    /// Content materialized into the per-task input artifact.
    pub payload: String,
}

impl SessionTask {
    /// Construct a task with default priority and an empty payload.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        command: CommandSpec,
        estimated_duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command,
            priority: 0,
            estimated_duration_ms,
            payload: String::new(),
        }
    }

    /// Set the payload written to the input artifact.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the priority hint.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// Check that task ids are non-blank, unique, and usable inside a file name.
///
/// Ids key the session registry and name the input artifact and log file,
/// so two tasks sharing an id would share both.
///
/// # Errors
///
/// Returns `AppError::Config` naming the first offending id.
pub fn validate_task_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(AppError::Config("task id must not be empty".into()));
        }
        if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(AppError::Config(format!(
                "task id is not a valid file name component: {id:?}"
            )));
        }
        if !seen.insert(id) {
            return Err(AppError::Config(format!("duplicate task id: {id}")));
        }
    }
    Ok(())
}
