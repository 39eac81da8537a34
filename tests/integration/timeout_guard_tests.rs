//! Integration tests for deadline escalation.
//!
//! Validates graceful termination, forced termination of a worker that
//! ignores the graceful signal, skipping the forceful signal when the worker
//! exits during the grace window, and idempotent escalation.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serial_test::serial;
use tokio::process::Command;

use agent_batch::models::session::{SessionStatus, TerminationKind};
use agent_batch::orchestrator::timeout_guard::{GuardOutcome, TimeoutGuard};

use super::test_helpers::{sh_task, test_launcher};

#[tokio::test]
#[serial]
async fn hung_session_terminates_within_deadline_plus_grace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = test_launcher(temp.path(), 2_000, 500);
    let started = Instant::now();

    let info = launcher
        .execute_task(sh_task("hung", "exec sleep 30", 1_000, temp.path()))
        .await
        .expect("join");
    let elapsed = started.elapsed();

    assert_eq!(info.status, SessionStatus::Terminated);
    assert_eq!(info.termination, Some(TerminationKind::Graceful));
    assert!(elapsed >= Duration::from_millis(3_000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(5_000), "{elapsed:?}");
    assert!(info.error.expect("message").contains("exceeded deadline"));
}

#[tokio::test]
async fn ignored_graceful_signal_escalates_to_kill() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = test_launcher(temp.path(), 300, 300);
    let script = "trap '' TERM; while :; do sleep 0.1; done";

    let info = launcher
        .execute_task(sh_task("stubborn", script, 0, temp.path()))
        .await
        .expect("join");

    assert_eq!(info.status, SessionStatus::Terminated);
    assert_eq!(info.termination, Some(TerminationKind::Forced));
}

#[tokio::test]
async fn exit_during_grace_skips_forceful_signal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = test_launcher(temp.path(), 300, 2_000);
    let script = "trap 'exit 7' TERM; while :; do sleep 0.1; done";
    let started = Instant::now();

    let info = launcher
        .execute_task(sh_task("polite", script, 0, temp.path()))
        .await
        .expect("join");

    assert_eq!(info.status, SessionStatus::Terminated);
    assert_eq!(info.termination, Some(TerminationKind::Graceful));
    assert!(started.elapsed() < Duration::from_millis(2_000));
}

#[tokio::test]
async fn natural_exit_before_deadline_is_not_terminated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let launcher = test_launcher(temp.path(), 1_000, 200);

    let info = launcher
        .execute_task(sh_task("quick", "sleep 0.2; exit 0", 0, temp.path()))
        .await
        .expect("join");

    assert_eq!(info.status, SessionStatus::Completed);
    assert!(info.termination.is_none());
}

#[tokio::test]
async fn escalation_on_exited_child_is_a_no_op() {
    let guard = TimeoutGuard::new(Duration::from_millis(10), Duration::from_millis(10));
    let mut child = Command::new("/bin/sh")
        .args(["-c", "exit 0"])
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn");
    child.wait().await.expect("wait");

    let first = guard.escalate(&mut child).await;
    let second = guard.escalate(&mut child).await;

    assert!(matches!(first, GuardOutcome::Exited(status) if status.success()));
    assert!(matches!(second, GuardOutcome::Exited(status) if status.success()));
}

#[tokio::test]
async fn repeated_escalation_after_termination_sends_nothing() {
    let guard = TimeoutGuard::new(Duration::from_millis(10), Duration::from_millis(500));
    let mut child = Command::new("/bin/sh")
        .args(["-c", "exec sleep 30"])
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("spawn");

    let first = guard.escalate(&mut child).await;
    let second = guard.escalate(&mut child).await;

    assert!(matches!(
        first,
        GuardOutcome::Terminated(TerminationKind::Graceful)
    ));
    assert!(matches!(second, GuardOutcome::Exited(status) if !status.success()));
}

#[test]
fn deadline_is_estimate_plus_buffer() {
    let guard = TimeoutGuard::new(Duration::from_millis(2_000), Duration::from_millis(500));
    let task = sh_task("t", "exit 0", 1_000, std::path::Path::new("."));
    assert_eq!(guard.deadline_for(&task), Duration::from_millis(3_000));
}
