//! Process signalling helpers.
//!
//! The graceful stop is `SIGTERM` on unix. Other platforms have no
//! equivalent, so the graceful stop falls back to the forceful kill.

use tokio::process::Child;
use tracing::debug;

use crate::{AppError, Result};

/// Ask the process with `pid` to stop.
///
/// A process that has already gone away is not an error.
///
/// # Errors
///
/// Returns `AppError::Io` if the signal could not be delivered.
#[cfg(unix)]
pub fn send_graceful_stop(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| AppError::Io(format!("pid {pid} out of range")))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {
            debug!(pid, "sent SIGTERM");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            debug!(pid, "process already gone");
            Ok(())
        }
        Err(err) => Err(AppError::Io(format!("failed to signal pid {pid}: {err}"))),
    }
}

/// Ask the process with `pid` to stop.
///
/// # Errors
///
/// Always returns `AppError::Io`: signalling by pid is only supported on unix.
#[cfg(not(unix))]
pub fn send_graceful_stop(pid: u32) -> Result<()> {
    Err(AppError::Io(format!(
        "graceful stop by pid is not supported on this platform (pid {pid})"
    )))
}

/// Send the graceful-stop signal to a child process the caller owns.
///
/// Does nothing if the child has already been reaped.
///
/// # Errors
///
/// Returns `AppError::Io` if the signal could not be delivered.
#[cfg(unix)]
pub fn graceful_stop(child: &mut Child) -> Result<()> {
    match child.id() {
        Some(pid) => send_graceful_stop(pid),
        None => Ok(()),
    }
}

/// Send the graceful-stop signal to a child process the caller owns.
///
/// # Errors
///
/// Returns `AppError::Io` if the process could not be stopped.
#[cfg(not(unix))]
pub fn graceful_stop(child: &mut Child) -> Result<()> {
    child
        .start_kill()
        .map_err(|err| AppError::Io(format!("failed to stop child: {err}")))
}
