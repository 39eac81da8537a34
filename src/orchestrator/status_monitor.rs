//! Periodic read-only status reporting over non-terminal sessions.
//!
//! The monitor runs for the whole orchestration, independent of batch
//! boundaries, and never mutates session records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::SessionRegistry;
use crate::models::session::{SessionInfo, SessionStatus};

/// One reported line for a non-terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Session id.
    pub id: String,
    /// Current status.
    pub status: SessionStatus,
    /// Milliseconds since registration.
    pub elapsed_ms: u64,
    /// Error text, if any.
    pub error: Option<String>,
}

/// Build status lines for the non-terminal sessions in `sessions`.
#[must_use]
pub fn status_lines(sessions: &[SessionInfo], now: DateTime<Utc>) -> Vec<StatusLine> {
    sessions
        .iter()
        .filter(|info| !info.status.is_terminal())
        .map(|info| StatusLine {
            id: info.id.clone(),
            status: info.status,
            elapsed_ms: info.elapsed_ms(now),
            error: info.error.clone(),
        })
        .collect()
}

/// Handle to a running status monitor.
///
/// [`stop`](Self::stop) may be called any number of times; only the first
/// call has an effect.
#[derive(Debug)]
pub struct StatusMonitorHandle {
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl StatusMonitorHandle {
    /// Stop the ticker and wait for it to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.await {
                debug!(%err, "status monitor task ended abnormally");
            }
            info!("status monitor stopped");
        }
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StatusMonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the status monitor ticking every `interval`.
#[must_use]
pub fn spawn_status_monitor(
    registry: SessionRegistry,
    interval: Duration,
    cancel: CancellationToken,
) -> StatusMonitorHandle {
    let task_cancel = cancel.clone();
    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = task_cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            report(&registry);
        }
    });

    StatusMonitorHandle {
        cancel,
        join_handle: Some(join_handle),
    }
}

fn report(registry: &SessionRegistry) {
    let lines = status_lines(&registry.non_terminal(), Utc::now());
    if lines.is_empty() {
        return;
    }
    let stats = registry.stats();
    info!(
        active = lines.len(),
        completed = stats.completed,
        failed = stats.failed,
        errors = stats.error,
        terminated = stats.terminated,
        "session status"
    );
    for line in lines {
        info!(
            session_id = %line.id,
            icon = line.status.icon(),
            state = %line.status,
            elapsed_ms = line.elapsed_ms,
            error = line.error.as_deref().unwrap_or(""),
            "session status"
        );
    }
}
