//! Runtime session model and lifecycle helpers.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::SessionTask;

/// Lifecycle status for a worker session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Registered; process not yet created.
    Starting,
    /// Process handle exists.
    Running,
    /// Worker exited with code 0.
    Completed,
    /// Worker exited with a nonzero code or was killed externally.
    Failed,
    /// Worker could not be started (or its input could not be written).
    Error,
    /// Worker was stopped by the timeout guard.
    Terminated,
}

impl SessionStatus {
    /// Whether no further transition can occur from this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Starting | Self::Running)
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running | Self::Error | Self::Terminated)
                | (
                    Self::Running,
                    Self::Completed | Self::Failed | Self::Error | Self::Terminated
                )
        )
    }

    /// Display icon for console output.
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Starting => "\u{23f3}",
            Self::Running => "\u{1f504}",
            Self::Completed => "\u{2705}",
            Self::Failed => "\u{274c}",
            Self::Error => "\u{1f4a5}",
            Self::Terminated => "\u{23f1}\u{fe0f}",
        }
    }

    /// Short lowercase tag used in log lines and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which worker output stream a chunk came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Prefix written before each chunk in the session log.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Stdout => "[stdout]",
            Self::Stderr => "[stderr]",
        }
    }
}

/// One captured piece of worker output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputChunk {
    /// Source stream.
    pub stream: OutputStream,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Bytes exactly as the worker wrote them.
    pub content: Vec<u8>,
}

impl OutputChunk {
    /// Content decoded for display; invalid UTF-8 is replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// How a guard-initiated termination concluded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    /// The process exited after the graceful-stop signal.
    Graceful,
    /// The process had to be force-killed after the grace window.
    Forced,
}

/// Runtime record for one launched task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionInfo {
    /// Task identifier.
    pub id: String,
    /// Task name.
    pub name: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Registration time.
    pub start_time: DateTime<Utc>,
    /// Time the terminal status was recorded.
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, set with the terminal status.
    pub duration_ms: Option<u64>,
    /// OS process id while the launcher holds a live process handle.
    #[serde(skip)]
    pub pid: Option<u32>,
    /// Append-only, time-ordered captured output.
    pub output: Vec<OutputChunk>,
    /// Failure description, if any.
    pub error: Option<String>,
    /// Worker exit code when it exited on its own.
    pub exit_code: Option<i32>,
    /// Set when the timeout guard stopped the session.
    pub termination: Option<TerminationKind>,
}

impl SessionInfo {
    /// Construct a `Starting` record for the given task.
    #[must_use]
    pub fn new(task: &SessionTask) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            status: SessionStatus::Starting,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            pid: None,
            output: Vec::new(),
            error: None,
            exit_code: None,
            termination: None,
        }
    }

    /// Milliseconds elapsed since registration, measured at `now`.
    #[must_use]
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.start_time).num_milliseconds()).unwrap_or(0)
    }

    /// Total bytes of captured output.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.output.iter().map(|chunk| chunk.content.len()).sum()
    }

    /// Everything captured from `stream`, decoded as one piece.
    #[must_use]
    pub fn stream_text(&self, stream: OutputStream) -> String {
        let bytes: Vec<u8> = self
            .output
            .iter()
            .filter(|chunk| chunk.stream == stream)
            .flat_map(|chunk| chunk.content.iter().copied())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
