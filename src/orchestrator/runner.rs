//! Top-level orchestration driver.
//!
//! Runs batches strictly in sequence: every session of a batch is launched
//! in input order, the whole batch is awaited, and a fixed delay elapses
//! before the next batch starts. A status monitor ticks for the whole run.
//! After the last batch the completion waiter catches any session still
//! outstanding, and the report is built and persisted.
//!
//! Individual session failures never abort the run. Only an unexpected
//! driver error triggers the cleanup coordinator, and that error is
//! returned to the caller unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::batch_planner::{self, Batch};
use super::cleanup::{self, CleanupReport};
use super::completion::wait_for_completion;
use super::launcher::SessionLauncher;
use super::registry::{Completion, SessionRegistry};
use super::status_monitor::{spawn_status_monitor, StatusMonitorHandle};
use crate::config::GlobalConfig;
use crate::models::session::{SessionInfo, SessionStatus};
use crate::models::task::{validate_task_ids, SessionTask};
use crate::report::{writer, ExecutionReport};
use crate::{AppError, Result};

/// Final result of a successful orchestration.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The consolidated report.
    pub report: ExecutionReport,
    /// Where the report was written, if persistence succeeded.
    pub report_path: Option<PathBuf>,
}

/// Per-task outcomes of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Batch position.
    pub index: usize,
    /// Final records, in launch order.
    pub sessions: Vec<SessionInfo>,
}

/// Drives a full orchestration run.
#[derive(Debug)]
pub struct Orchestrator {
    config: Arc<GlobalConfig>,
    registry: SessionRegistry,
    launcher: SessionLauncher,
}

impl Orchestrator {
    /// Construct an orchestrator with a fresh registry.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let registry = SessionRegistry::new();
        let launcher = SessionLauncher::from_config(registry.clone(), &config);
        Self {
            config,
            registry,
            launcher,
        }
    }

    /// Shared registry of this run.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Run all `tasks`, running cleanup if the driver fails.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` before anything is launched if task ids
    /// are blank, duplicated, or not usable as file names. Otherwise returns
    /// the driver error after best-effort cleanup has run.
    pub async fn execute(&self, tasks: Vec<SessionTask>) -> Result<RunSummary> {
        validate_task_ids(tasks.iter().map(|task| task.id.as_str()))?;

        let mut monitor = spawn_status_monitor(
            self.registry.clone(),
            self.config.status_interval(),
            CancellationToken::new(),
        );

        let result = self.run(tasks, &mut monitor).await;
        monitor.stop().await;

        if let Err(ref err) = result {
            error!(%err, "orchestration failed");
            self.cleanup();
        }
        result
    }

    /// Ask one running session to stop.
    ///
    /// # Errors
    ///
    /// See [`cleanup::cancel_session`].
    pub fn cancel_session(&self, id: &str) -> Result<bool> {
        cleanup::cancel_session(&self.registry, id)
    }

    /// Active sessions in registration order.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.registry.non_terminal()
    }

    /// Best-effort termination of stragglers and input removal.
    pub fn cleanup(&self) -> CleanupReport {
        cleanup::cleanup(&self.registry, &self.config.paths.scratch_dir)
    }

    async fn run(
        &self,
        tasks: Vec<SessionTask>,
        monitor: &mut StatusMonitorHandle,
    ) -> Result<RunSummary> {
        self.prepare_directories()?;

        let total = tasks.len();
        let batches = batch_planner::partition(tasks, self.config.max_concurrent_sessions);
        let batch_count = batches.len();
        info!(
            total,
            batches = batch_count,
            max_concurrent = self.config.max_concurrent_sessions,
            "starting orchestration"
        );

        for batch in batches {
            let index = batch.index;
            let outcome = self
                .run_batch(batch)
                .instrument(info_span!("batch", index))
                .await;
            let completed = outcome
                .sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Completed)
                .count();
            info!(
                batch = index,
                completed,
                settled = outcome.sessions.len(),
                "batch settled"
            );

            if index + 1 < batch_count {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        wait_for_completion(&self.registry, self.config.completion_poll()).await;
        monitor.stop().await;

        let results = self.registry.results();
        let (report, report_path) =
            writer::aggregate_and_persist(&results, &self.config.paths.report_path);
        let stats = self.registry.stats();
        info!(
            total = report.summary.total_tasks,
            completed = report.summary.completed_tasks,
            failed = report.summary.failed_tasks,
            errors = report.summary.error_tasks,
            terminated = stats.terminated,
            "orchestration complete"
        );

        Ok(RunSummary {
            report,
            report_path,
        })
    }

    /// Launch every task of `batch` and wait for all of them to settle.
    ///
    /// Always succeeds at the batch level; a session task that dies
    /// unexpectedly is recorded as an `error` outcome.
    pub async fn run_batch(&self, batch: Batch) -> BatchOutcome {
        info!(size = batch.len(), "launching batch");
        let launched: Vec<_> = batch
            .tasks
            .into_iter()
            .map(|task| {
                let id = task.id.clone();
                (id, self.launcher.execute_task(task))
            })
            .collect();

        let (ids, handles): (Vec<_>, Vec<_>) = launched.into_iter().unzip();
        let joined = join_all(handles).await;

        let sessions = ids
            .into_iter()
            .zip(joined)
            .filter_map(|(id, joined)| match joined {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!(session_id = %id, %err, "session task ended unexpectedly");
                    self.settle_lost_session(&id, &err.to_string())
                }
            })
            .collect();

        BatchOutcome {
            index: batch.index,
            sessions,
        }
    }

    /// Record an `error` outcome for a session whose task died.
    fn settle_lost_session(&self, id: &str, reason: &str) -> Option<SessionInfo> {
        let completion = Completion::new(SessionStatus::Error)
            .with_error(format!("session task failed: {reason}"));
        let info = self
            .registry
            .finish(id, completion)
            .or_else(|| self.registry.get(id))?;
        self.registry.record_result(info.clone());
        Some(info)
    }

    fn prepare_directories(&self) -> Result<()> {
        for dir in [&self.config.paths.scratch_dir, &self.config.paths.log_dir] {
            std::fs::create_dir_all(dir).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", dir.display()))
            })?;
        }
        Ok(())
    }
}
