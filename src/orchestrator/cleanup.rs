//! Best-effort cleanup for failure and shutdown paths.
//!
//! Sends one graceful-stop signal to every session still holding a live
//! process and removes transient input artifacts. The sweep never returns
//! an error: problems are logged as warnings so the triggering error stays
//! the one the caller sees. [`cancel_session`] stops a single session on
//! request and does report failures.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, info_span, warn};

use super::launcher::{INPUT_EXTENSION, INPUT_PREFIX};
use super::registry::SessionRegistry;
use super::signals;
use crate::{AppError, Result};

/// What a cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Sessions that were sent a graceful-stop signal.
    pub signalled: usize,
    /// Input artifacts removed.
    pub removed: usize,
}

/// Stop straggling sessions and remove input artifacts under `scratch_dir`.
pub fn cleanup(registry: &SessionRegistry, scratch_dir: &Path) -> CleanupReport {
    let _span = info_span!("cleanup").entered();
    let mut report = CleanupReport::default();

    for (session_id, pid) in registry.live_pids() {
        match signals::send_graceful_stop(pid) {
            Ok(()) => {
                info!(session_id, pid, "sent graceful stop to straggling session");
                report.signalled += 1;
            }
            Err(err) => warn!(session_id, pid, %err, "failed to stop straggling session"),
        }
    }

    report.removed = remove_input_artifacts(scratch_dir);
    info!(
        signalled = report.signalled,
        removed = report.removed,
        "cleanup complete"
    );
    report
}

/// Send the graceful-stop signal to one session.
///
/// Returns `Ok(false)` when the session holds no live process, either
/// because it has not spawned yet or because it already settled. A signalled
/// session settles through its launcher like any other exit.
///
/// # Errors
///
/// Returns `AppError::NotFound` if no session is registered under `id`, or
/// `AppError::Io` if the signal could not be delivered.
pub fn cancel_session(registry: &SessionRegistry, id: &str) -> Result<bool> {
    if !registry.contains(id) {
        return Err(AppError::NotFound(format!("session {id}")));
    }
    let Some(pid) = registry.live_pid(id) else {
        info!(session_id = id, "cancel requested for session without live process");
        return Ok(false);
    };
    signals::send_graceful_stop(pid)?;
    info!(session_id = id, pid, "sent graceful stop on request");
    Ok(true)
}

/// Remove every `session-input-*.md` file under `scratch_dir`.
///
/// Returns the number of files removed. Files that disappear concurrently
/// are ignored. Glob metacharacters in `scratch_dir` match literally.
pub fn remove_input_artifacts(scratch_dir: &Path) -> usize {
    let dir = glob::Pattern::escape(&scratch_dir.to_string_lossy());
    let pattern = Path::new(&dir).join(format!("{INPUT_PREFIX}*.{INPUT_EXTENSION}"));
    let pattern = pattern.to_string_lossy();
    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(%err, pattern = %pattern, "invalid cleanup pattern");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "failed to read scratch entry");
                continue;
            }
        };
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), %err, "failed to remove input artifact"),
        }
    }
    removed
}
