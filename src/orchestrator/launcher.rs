//! Worker session launcher.
//!
//! [`SessionLauncher::execute_task`] registers the session synchronously,
//! then spawns one tokio task that owns the worker process for its whole
//! lifetime: materialize the input artifact, spawn the worker, wire its
//! output into capture, supervise it under the [`TimeoutGuard`], and record
//! exactly one terminal outcome. Every path, including launch failures,
//! funnels through [`SessionLauncher::finalize`], which writes the result
//! registry entry.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use bytes::BytesMut;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, info, info_span, warn, Instrument};

use super::registry::{Completion, SessionRegistry};
use super::session_log::SessionLog;
use super::timeout_guard::{GuardOutcome, TimeoutGuard};
use crate::config::GlobalConfig;
use crate::models::session::{OutputChunk, OutputStream, SessionInfo, SessionStatus};
use crate::models::task::SessionTask;
use crate::{AppError, Result};

/// Prefix of every materialized input artifact.
pub const INPUT_PREFIX: &str = "session-input-";

/// Extension of every materialized input artifact.
pub const INPUT_EXTENSION: &str = "md";

/// How long to wait for output readers to drain after the worker settles.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the per-session output channel.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Path of the input artifact for `task_id` under `scratch_dir`.
#[must_use]
pub fn input_path(scratch_dir: &Path, task_id: &str) -> PathBuf {
    scratch_dir.join(format!("{INPUT_PREFIX}{task_id}.{INPUT_EXTENSION}"))
}

/// Write the task payload to its input artifact.
///
/// # Errors
///
/// Returns `AppError::Launch` if the scratch directory or file cannot be
/// written.
pub fn materialize_input(scratch_dir: &Path, task: &SessionTask) -> Result<PathBuf> {
    fs::create_dir_all(scratch_dir).map_err(|err| {
        AppError::Launch(format!(
            "failed to create scratch directory {}: {err}",
            scratch_dir.display()
        ))
    })?;
    let path = input_path(scratch_dir, &task.id);
    fs::write(&path, &task.payload).map_err(|err| {
        AppError::Launch(format!("failed to write input {}: {err}", path.display()))
    })?;
    Ok(path)
}

/// Tasks moving one session's output into the registry and log.
#[derive(Debug)]
struct OutputCapture {
    sink: JoinHandle<()>,
    readers: Vec<JoinHandle<()>>,
}

/// Result of running one session, before it is written to the registry.
#[derive(Debug)]
enum SessionOutcome {
    Settled(GuardOutcome),
    LaunchFailed(AppError),
}

/// Launches worker sessions and records their outcomes.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    registry: SessionRegistry,
    guard: TimeoutGuard,
    scratch_dir: PathBuf,
    log_dir: PathBuf,
}

impl SessionLauncher {
    /// Construct a launcher writing into `registry`.
    #[must_use]
    pub fn new(
        registry: SessionRegistry,
        guard: TimeoutGuard,
        scratch_dir: PathBuf,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            guard,
            scratch_dir,
            log_dir,
        }
    }

    /// Construct a launcher from the global configuration.
    #[must_use]
    pub fn from_config(registry: SessionRegistry, config: &GlobalConfig) -> Self {
        Self::new(
            registry,
            TimeoutGuard::new(config.timeout_buffer(), config.grace_period()),
            config.paths.scratch_dir.clone(),
            config.paths.log_dir.clone(),
        )
    }

    /// Registry this launcher writes into.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Register `task` and start its session.
    ///
    /// The `Starting` record is visible in the registry before this function
    /// returns; the returned handle resolves to the final record.
    pub fn execute_task(&self, task: SessionTask) -> JoinHandle<SessionInfo> {
        self.registry.register(&task);
        let launcher = self.clone();
        let span = info_span!("session", session_id = %task.id, name = %task.name);
        tokio::spawn(
            async move {
                let outcome = launcher.run(&task).await;
                launcher.finalize(&task, outcome)
            }
            .instrument(span),
        )
    }

    async fn run(&self, task: &SessionTask) -> SessionOutcome {
        let mut log = match self.prepare(task) {
            Ok(log) => log,
            Err(err) => return SessionOutcome::LaunchFailed(err),
        };

        let input = match materialize_input(&self.scratch_dir, task) {
            Ok(path) => path,
            Err(err) => {
                log_error_line(&mut log, &err);
                log.close();
                return SessionOutcome::LaunchFailed(err);
            }
        };

        let mut child = match spawn_worker(task, &input) {
            Ok(child) => child,
            Err(err) => {
                log_error_line(&mut log, &err);
                log.close();
                return SessionOutcome::LaunchFailed(err);
            }
        };

        let pid = child.id();
        self.registry.mark_running(&task.id, pid);
        info!(pid = pid.unwrap_or(0), executable = %task.command.executable, "worker spawned");

        let capture = self.spawn_output_sink(&task.id, &mut child, log);
        let deadline = self.guard.deadline_for(task);
        let settled = self.guard.supervise(&mut child, deadline).await;
        drain_output(capture).await;

        SessionOutcome::Settled(settled)
    }

    fn prepare(&self, task: &SessionTask) -> Result<SessionLog> {
        SessionLog::create(&self.log_dir, &task.id)
            .map_err(|err| AppError::Launch(format!("failed to open session log: {err}")))
    }

    /// Forward the child's stdout/stderr into the registry and the log.
    ///
    /// One reader per stream feeds a single sink task, which timestamps
    /// chunks in arrival order and closes the log when both streams end.
    fn spawn_output_sink(
        &self,
        session_id: &str,
        child: &mut Child,
        mut log: SessionLog,
    ) -> OutputCapture {
        let (tx, mut rx) = mpsc::channel::<(OutputStream, BytesMut)>(OUTPUT_CHANNEL_CAPACITY);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, tx.clone()));
        }
        drop(tx);

        let registry = self.registry.clone();
        let session_id = session_id.to_owned();
        let sink = tokio::spawn(
            async move {
                while let Some((stream, bytes)) = rx.recv().await {
                    let chunk = OutputChunk {
                        stream,
                        timestamp: Utc::now(),
                        content: bytes.to_vec(),
                    };
                    if let Err(err) = log.append(&chunk) {
                        warn!(%err, "failed to mirror output to session log");
                    }
                    registry.append_output(&session_id, chunk);
                }
                log.close();
                debug!("session log closed");
            }
            .in_current_span(),
        );

        OutputCapture { sink, readers }
    }

    /// Write the terminal status and the single results entry.
    fn finalize(&self, task: &SessionTask, outcome: SessionOutcome) -> SessionInfo {
        let completion = match outcome {
            SessionOutcome::Settled(GuardOutcome::Exited(status)) => {
                if status.success() {
                    Completion::new(SessionStatus::Completed).with_exit_code(status.code())
                } else {
                    let reason = status.code().map_or_else(
                        || "terminated by signal".to_owned(),
                        |code| format!("exited with code {code}"),
                    );
                    Completion::new(SessionStatus::Failed)
                        .with_exit_code(status.code())
                        .with_error(reason)
                }
            }
            SessionOutcome::Settled(GuardOutcome::Terminated(kind)) => {
                Completion::new(SessionStatus::Terminated)
                    .with_termination(kind)
                    .with_error(format!(
                        "exceeded deadline of {}ms",
                        self.guard.deadline_for(task).as_millis()
                    ))
            }
            SessionOutcome::Settled(GuardOutcome::WaitFailed(reason)) => {
                Completion::new(SessionStatus::Failed).with_error(format!("wait failed: {reason}"))
            }
            SessionOutcome::LaunchFailed(err) => {
                Completion::new(SessionStatus::Error).with_error(err.to_string())
            }
        };

        let info = self.registry.finish(&task.id, completion).unwrap_or_else(|| {
            warn!("session settled twice; keeping first outcome");
            self.registry
                .get(&task.id)
                .unwrap_or_else(|| SessionInfo::new(task))
        });

        let icon = info.status.icon();
        if info.status == SessionStatus::Completed {
            info!(icon, status = %info.status, duration_ms = info.duration_ms, "session finished");
        } else {
            warn!(
                icon,
                status = %info.status,
                duration_ms = info.duration_ms,
                error = info.error.as_deref().unwrap_or(""),
                "session finished"
            );
        }

        self.registry.record_result(info.clone());
        info
    }
}

/// Build and spawn the worker process for `task`.
fn spawn_worker(task: &SessionTask, input: &Path) -> Result<Child> {
    let mut cmd = Command::new(&task.command.executable);
    cmd.args(task.command.render_args(input))
        .current_dir(&task.command.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn().map_err(|err| {
        AppError::Launch(format!(
            "failed to spawn {}: {err}",
            task.command.executable
        ))
    })
}

/// Read one output stream until EOF.
///
/// Chunks are cut on UTF-8 character boundaries: a multi-byte sequence split
/// across two reads is held back and sent whole with the next read. Bytes
/// are never rewritten.
fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, BytesMut)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut frames = FramedRead::new(reader, BytesCodec::new());
            let mut pending = BytesMut::new();
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(bytes) => {
                        pending.extend_from_slice(&bytes);
                        let ready = split_complete(&mut pending);
                        if !ready.is_empty() && tx.send((stream, ready)).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(%err, stream = stream.tag(), "failed to read worker output");
                        break;
                    }
                }
            }
            if !pending.is_empty() {
                // Receiver gone means the session already settled.
                let _ = tx.send((stream, pending)).await;
            }
        }
        .in_current_span(),
    )
}

/// Split off the part of `pending` that does not end inside a UTF-8
/// sequence, leaving the incomplete tail in place.
fn split_complete(pending: &mut BytesMut) -> BytesMut {
    let complete = pending.len() - incomplete_suffix_len(pending);
    pending.split_to(complete)
}

/// Length of a truncated multi-byte sequence at the end of `bytes`, or 0.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for (i, &byte) in bytes.iter().enumerate().skip(start).rev() {
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 1,
        };
        return if i + width > bytes.len() {
            bytes.len() - i
        } else {
            0
        };
    }
    0
}

async fn drain_output(capture: OutputCapture) {
    let OutputCapture { mut sink, readers } = capture;
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut sink).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%err, "output sink task failed"),
        Err(_) => {
            warn!("output streams still open after worker exit; detaching capture");
            for reader in &readers {
                reader.abort();
            }
            sink.abort();
        }
    }
}

fn log_error_line(log: &mut SessionLog, err: &AppError) {
    let chunk = OutputChunk {
        stream: OutputStream::Stderr,
        timestamp: Utc::now(),
        content: format!("{err}\n").into_bytes(),
    };
    if let Err(write_err) = log.append(&chunk) {
        warn!(%write_err, "failed to write launch error to session log");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
