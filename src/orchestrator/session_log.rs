//! Append-only per-session log sink.
//!
//! Each captured chunk is written to `<log_dir>/session-<id>.log` prefixed
//! with its stream tag. The file is flushed after every chunk so a crash of
//! the orchestrator loses nothing already captured.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::models::session::OutputChunk;
use crate::{AppError, Result};

/// Durable log for one session's output.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SessionLog {
    /// Path of the log file for `session_id` under `log_dir`.
    #[must_use]
    pub fn path_for(log_dir: &Path, session_id: &str) -> PathBuf {
        log_dir.join(format!("session-{session_id}.log"))
    }

    /// Open (or create) the session log in append mode.
    ///
    /// Creates `log_dir` and all parent directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be created.
    pub fn create(log_dir: &Path, session_id: &str) -> Result<Self> {
        fs::create_dir_all(log_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create log directory {}: {e}",
                log_dir.display()
            ))
        })?;
        let path = Self::path_for(log_dir, session_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Io(format!("failed to open log {}: {e}", path.display())))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Append one chunk's raw bytes, prefixed with its stream tag.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the write or flush fails.
    pub fn append(&mut self, chunk: &OutputChunk) -> Result<()> {
        write!(self.writer, "{} ", chunk.stream.tag())
            .and_then(|()| self.writer.write_all(&chunk.content))
            .and_then(|()| {
                if chunk.content.ends_with(b"\n") {
                    Ok(())
                } else {
                    writeln!(self.writer)
                }
            })
            .and_then(|()| self.writer.flush())
            .map_err(|e| AppError::Io(format!("session log write failed: {e}")))
    }

    /// Flush and close the log.
    pub fn close(mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), "failed to flush session log: {e}");
        }
    }
}
