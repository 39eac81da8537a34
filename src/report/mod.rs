//! Execution report aggregation.
//!
//! Reduces the results registry into an [`ExecutionReport`]: bucket counts,
//! summed duration, per-task outcome records, and advisory strings from
//! fixed threshold rules. Guard-terminated sessions count as failed.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::session::{SessionInfo, SessionStatus};

/// Aggregate counts for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Number of recorded sessions.
    pub total_tasks: usize,
    /// Sessions that exited with code 0.
    pub completed_tasks: usize,
    /// Sessions that exited nonzero or were terminated.
    pub failed_tasks: usize,
    /// Sessions that could not be started.
    pub error_tasks: usize,
    /// Sum of individual session durations.
    pub total_duration_ms: u64,
    /// Report creation time (ISO-8601).
    pub timestamp: DateTime<Utc>,
}

/// Per-task outcome record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    /// Task id.
    pub id: String,
    /// Task name.
    pub name: String,
    /// Terminal status.
    pub status: SessionStatus,
    /// Session duration in milliseconds.
    pub duration: u64,
    /// Captured output size in bytes.
    pub output_size: usize,
    /// Whether an error message was recorded.
    pub has_error: bool,
}

/// Consolidated report for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Aggregate counts.
    pub summary: ReportSummary,
    /// One record per task, in registration order.
    pub tasks: Vec<TaskOutcome>,
    /// Advisory findings.
    pub recommendations: Vec<String>,
    /// Advisory follow-ups.
    pub next_steps: Vec<String>,
}

impl ExecutionReport {
    /// Percentage of tasks that completed, or 0 for an empty run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Task counts are far below 2^52.
    pub fn success_rate(&self) -> f64 {
        if self.summary.total_tasks == 0 {
            return 0.0;
        }
        self.summary.completed_tasks as f64 / self.summary.total_tasks as f64 * 100.0
    }
}

/// Report bucket a status is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Counted as completed.
    Completed,
    /// Counted as failed.
    Failed,
    /// Counted as error.
    Error,
}

/// Classify a status into its report bucket.
///
/// Guard termination has no distinct bucket and counts as a failure, as
/// does any session that somehow reached the results without settling.
#[must_use]
pub fn bucket_for(status: SessionStatus) -> Bucket {
    match status {
        SessionStatus::Completed => Bucket::Completed,
        SessionStatus::Error => Bucket::Error,
        SessionStatus::Failed
        | SessionStatus::Terminated
        | SessionStatus::Starting
        | SessionStatus::Running => Bucket::Failed,
    }
}

/// Builds execution reports from session results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAggregator;

impl ReportAggregator {
    /// Reduce `results` into a report stamped with the current time.
    #[must_use]
    pub fn build(results: &[SessionInfo]) -> ExecutionReport {
        Self::build_at(results, Utc::now())
    }

    /// Reduce `results` into a report stamped with `timestamp`.
    #[must_use]
    pub fn build_at(results: &[SessionInfo], timestamp: DateTime<Utc>) -> ExecutionReport {
        let mut summary = ReportSummary {
            total_tasks: results.len(),
            completed_tasks: 0,
            failed_tasks: 0,
            error_tasks: 0,
            total_duration_ms: 0,
            timestamp,
        };

        let tasks = results
            .iter()
            .map(|info| {
                match bucket_for(info.status) {
                    Bucket::Completed => summary.completed_tasks += 1,
                    Bucket::Failed => summary.failed_tasks += 1,
                    Bucket::Error => summary.error_tasks += 1,
                }
                let duration = info.duration_ms.unwrap_or(0);
                summary.total_duration_ms = summary.total_duration_ms.saturating_add(duration);
                TaskOutcome {
                    id: info.id.clone(),
                    name: info.name.clone(),
                    status: info.status,
                    duration,
                    output_size: info.output_size(),
                    has_error: info.error.is_some(),
                }
            })
            .collect();

        let recommendations = recommendations(&summary);
        let next_steps = next_steps(&summary);

        ExecutionReport {
            summary,
            tasks,
            recommendations,
            next_steps,
        }
    }
}

fn recommendations(summary: &ReportSummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.failed_tasks > 0 {
        out.push(format!(
            "Inspect session logs for {} failed task(s)",
            summary.failed_tasks
        ));
    }
    if summary.error_tasks > 0 {
        out.push(format!(
            "Verify the worker executable and inputs for {} task(s) that could not start",
            summary.error_tasks
        ));
    }
    if summary.total_tasks > 0 && summary.completed_tasks == summary.total_tasks {
        out.push("All sessions completed successfully".to_owned());
    }
    out
}

fn next_steps(summary: &ReportSummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.completed_tasks > 0 {
        out.push("Review completed task output and proceed to the next phase".to_owned());
    }
    if summary.failed_tasks + summary.error_tasks > 0 {
        out.push("Address failures and re-run the affected tasks".to_owned());
    }
    out
}
