//! Per-session deadline with graceful → forceful escalation.
//!
//! [`TimeoutGuard::supervise`] races the child's exit against a single-shot
//! deadline of `estimated_duration + buffer`. When the exit wins, the
//! deadline future is dropped in the same `select!`, so the timer can never
//! fire after the session has settled. When the deadline wins, the guard
//! sends the graceful-stop signal, waits up to `grace`, and force-kills the
//! process only if it is still alive.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{info, warn};

use super::signals;
use crate::models::session::TerminationKind;
use crate::models::task::SessionTask;

/// How a supervised child settled.
#[derive(Debug)]
pub enum GuardOutcome {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The guard stopped the process.
    Terminated(TerminationKind),
    /// Waiting on the process failed.
    WaitFailed(String),
}

/// Deadline and escalation settings shared by all sessions.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    buffer: Duration,
    grace: Duration,
}

impl TimeoutGuard {
    /// Construct a guard with a fixed buffer and grace window.
    #[must_use]
    pub fn new(buffer: Duration, grace: Duration) -> Self {
        Self { buffer, grace }
    }

    /// Deadline for `task`: its estimated duration plus the buffer.
    #[must_use]
    pub fn deadline_for(&self, task: &SessionTask) -> Duration {
        Duration::from_millis(task.estimated_duration_ms).saturating_add(self.buffer)
    }

    /// Wait for `child` to exit, escalating once `deadline` elapses.
    pub async fn supervise(&self, child: &mut Child, deadline: Duration) -> GuardOutcome {
        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => GuardOutcome::Exited(status),
                Err(err) => GuardOutcome::WaitFailed(err.to_string()),
            },
            () = tokio::time::sleep(deadline) => {
                warn!(deadline_ms = deadline.as_millis(), "session exceeded deadline");
                self.escalate(child).await
            }
        }
    }

    /// Stop `child`: graceful signal, then a forceful kill after the grace
    /// window if it is still running.
    ///
    /// Calling this on a child that has already exited sends nothing and
    /// returns [`GuardOutcome::Exited`], so repeated calls are harmless.
    pub async fn escalate(&self, child: &mut Child) -> GuardOutcome {
        match child.try_wait() {
            Ok(Some(status)) => return GuardOutcome::Exited(status),
            Ok(None) => {}
            Err(err) => return GuardOutcome::WaitFailed(err.to_string()),
        }

        if let Err(err) = signals::graceful_stop(child) {
            warn!(%err, "graceful stop failed");
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "session stopped after graceful signal");
                GuardOutcome::Terminated(TerminationKind::Graceful)
            }
            Ok(Err(err)) => GuardOutcome::WaitFailed(err.to_string()),
            Err(_) => {
                // Exited right as the grace window closed.
                if let Ok(Some(_)) = child.try_wait() {
                    return GuardOutcome::Terminated(TerminationKind::Graceful);
                }
                warn!(
                    grace_ms = self.grace.as_millis(),
                    "session ignored graceful signal, forcing kill"
                );
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to force-kill session process");
                }
                GuardOutcome::Terminated(TerminationKind::Forced)
            }
        }
    }
}
