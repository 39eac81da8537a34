//! Shared session registry.
//!
//! Holds the live map (task id → [`SessionInfo`]) that the launcher, status
//! monitor, completion waiter, and cleanup coordinator all observe, plus the
//! results map that receives exactly one final record per task.
//!
//! Every session has a single writer: the launcher task that owns its
//! process. Status writes go through [`SessionRegistry::finish`], which only
//! accepts the first terminal status, so a late write can never overwrite a
//! recorded outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::session::{OutputChunk, SessionInfo, SessionStatus, TerminationKind};
use crate::models::task::SessionTask;

#[derive(Debug, Default)]
struct RegistryState {
    /// Insertion order of session ids, for stable snapshots.
    order: Vec<String>,
    sessions: HashMap<String, SessionInfo>,
    results: HashMap<String, SessionInfo>,
}

/// Terminal outcome written by [`SessionRegistry::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Terminal status to record.
    pub status: SessionStatus,
    /// Failure description.
    pub error: Option<String>,
    /// Exit code when the worker exited on its own.
    pub exit_code: Option<i32>,
    /// Set when the timeout guard stopped the session.
    pub termination: Option<TerminationKind>,
}

impl Completion {
    /// A completion with only a status.
    #[must_use]
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            error: None,
            exit_code: None,
            termination: None,
        }
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach an exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attach a termination kind.
    #[must_use]
    pub fn with_termination(mut self, kind: TerminationKind) -> Self {
        self.termination = Some(kind);
        self
    }
}

/// Per-status session counts at one instant.
///
/// Unlike the report buckets, guard-terminated sessions are counted
/// separately here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Registered sessions.
    pub total: usize,
    /// Registered, process not yet created.
    pub starting: usize,
    /// Process running.
    pub running: usize,
    /// Exited with code 0.
    pub completed: usize,
    /// Exited nonzero or killed externally.
    pub failed: usize,
    /// Could not be started.
    pub error: usize,
    /// Stopped by the timeout guard.
    pub terminated: usize,
}

impl SessionStats {
    /// Sessions not yet terminal.
    #[must_use]
    pub fn active(&self) -> usize {
        self.starting + self.running
    }
}

/// Cloneable handle to the shared registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves the maps consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a `Starting` session for `task` and return its snapshot.
    ///
    /// Re-registering an id that is already present returns the existing
    /// record unchanged.
    pub fn register(&self, task: &SessionTask) -> SessionInfo {
        let mut state = self.lock();
        if let Some(existing) = state.sessions.get(&task.id) {
            warn!(session_id = %task.id, "session already registered");
            return existing.clone();
        }
        let info = SessionInfo::new(task);
        state.order.push(task.id.clone());
        state.sessions.insert(task.id.clone(), info.clone());
        debug!(session_id = %task.id, "session registered");
        info
    }

    /// Transition a `Starting` session to `Running` with the given pid.
    ///
    /// Returns `false` if the session is unknown or not `Starting`.
    pub fn mark_running(&self, id: &str, pid: Option<u32>) -> bool {
        let mut state = self.lock();
        let Some(info) = state.sessions.get_mut(id) else {
            return false;
        };
        if !info.status.can_transition_to(SessionStatus::Running) {
            return false;
        }
        info.status = SessionStatus::Running;
        info.pid = pid;
        true
    }

    /// Append a captured chunk to a session's output.
    ///
    /// The chunk is accepted in any status so that output drained after the
    /// terminal status is still kept.
    pub fn append_output(&self, id: &str, chunk: OutputChunk) {
        let mut state = self.lock();
        if let Some(info) = state.sessions.get_mut(id) {
            info.output.push(chunk);
        }
    }

    /// Record the terminal status for a session.
    ///
    /// Returns the final snapshot, or `None` when the session is unknown or
    /// already terminal (the first terminal write wins).
    pub fn finish(&self, id: &str, completion: Completion) -> Option<SessionInfo> {
        let mut state = self.lock();
        let info = state.sessions.get_mut(id)?;
        if info.status.is_terminal() || !info.status.can_transition_to(completion.status) {
            debug!(
                session_id = id,
                current = %info.status,
                requested = %completion.status,
                "ignoring terminal write on settled session"
            );
            return None;
        }

        let now = Utc::now();
        info.status = completion.status;
        info.end_time = Some(now);
        info.duration_ms = Some(info.elapsed_ms(now));
        info.pid = None;
        info.exit_code = completion.exit_code;
        info.termination = completion.termination;
        if completion.error.is_some() {
            info.error = completion.error;
        }
        Some(info.clone())
    }

    /// Write a session's final record into the results map.
    ///
    /// Returns `false` (and leaves the existing entry untouched) when a
    /// result for this id was already recorded.
    pub fn record_result(&self, info: SessionInfo) -> bool {
        let mut state = self.lock();
        if state.results.contains_key(&info.id) {
            warn!(session_id = %info.id, "result already recorded; ignoring duplicate");
            return false;
        }
        state.results.insert(info.id.clone(), info);
        true
    }

    /// Current snapshot of one session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        self.lock().sessions.get(id).cloned()
    }

    /// Snapshot of all sessions in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.sessions.get(id).cloned())
            .collect()
    }

    /// Snapshot of sessions that have not reached a terminal status.
    #[must_use]
    pub fn non_terminal(&self) -> Vec<SessionInfo> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .filter(|info| !info.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Number of sessions that have not reached a terminal status.
    #[must_use]
    pub fn non_terminal_count(&self) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|info| !info.status.is_terminal())
            .count()
    }

    /// Count sessions by status.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let state = self.lock();
        let mut stats = SessionStats {
            total: state.sessions.len(),
            ..SessionStats::default()
        };
        for info in state.sessions.values() {
            let slot = match info.status {
                SessionStatus::Starting => &mut stats.starting,
                SessionStatus::Running => &mut stats.running,
                SessionStatus::Completed => &mut stats.completed,
                SessionStatus::Failed => &mut stats.failed,
                SessionStatus::Error => &mut stats.error,
                SessionStatus::Terminated => &mut stats.terminated,
            };
            *slot += 1;
        }
        stats
    }

    /// Live pid of a non-terminal session, if its process exists.
    #[must_use]
    pub fn live_pid(&self, id: &str) -> Option<u32> {
        self.lock()
            .sessions
            .get(id)
            .filter(|info| !info.status.is_terminal())
            .and_then(|info| info.pid)
    }

    /// Whether `id` has been registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().sessions.contains_key(id)
    }

    /// `(id, pid)` pairs for non-terminal sessions holding a live process.
    #[must_use]
    pub fn live_pids(&self) -> Vec<(String, u32)> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .filter(|info| !info.status.is_terminal())
            .filter_map(|info| info.pid.map(|pid| (info.id.clone(), pid)))
            .collect()
    }

    /// Final records in registration order.
    #[must_use]
    pub fn results(&self) -> Vec<SessionInfo> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.results.get(id).cloned())
            .collect()
    }

    /// Number of recorded results.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }
}
