//! End-to-end orchestration tests.
//!
//! Validates single- and multi-batch runs, sequential batch gating with the
//! inter-batch delay, the per-batch concurrency bound, launch failure
//! isolation, exactly-once results, and report persistence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tokio_util::sync::CancellationToken;

use agent_batch::models::session::SessionStatus;
use agent_batch::models::task::{CommandSpec, SessionTask};
use agent_batch::orchestrator::runner::Orchestrator;
use agent_batch::report::ExecutionReport;
use agent_batch::AppError;

use super::test_helpers::{sh_task, shared, test_config};

#[tokio::test]
async fn single_batch_all_complete() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 5_000, 500);
    let report_path = config.paths.report_path.clone();
    assert!(!report_path.parent().expect("parent").exists());

    let tasks = (0..5)
        .map(|i| sh_task(&format!("t{i}"), "exit 0", 100, temp.path()))
        .collect();
    let orchestrator = Orchestrator::new(shared(config));
    let summary = orchestrator.execute(tasks).await.expect("run succeeds");

    assert_eq!(summary.report.summary.total_tasks, 5);
    assert_eq!(summary.report.summary.completed_tasks, 5);
    assert!((summary.report.success_rate() - 100.0).abs() < f64::EPSILON);

    // The report directory did not exist before the run.
    let written = summary.report_path.expect("report persisted");
    assert_eq!(written, report_path);
    let raw = std::fs::read_to_string(&written).expect("read report");
    let parsed: ExecutionReport = serde_json::from_str(&raw).expect("valid report");
    assert_eq!(parsed.summary.completed_tasks, 5);
}

#[tokio::test]
#[serial]
async fn second_batch_waits_for_first_and_delay() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 5_000, 500);
    let delay = config.batch_delay();

    let tasks = (0..6)
        .map(|i| sh_task(&format!("t{i}"), "sleep 0.3", 300, temp.path()))
        .collect();
    let orchestrator = Orchestrator::new(shared(config));
    let summary = orchestrator.execute(tasks).await.expect("run succeeds");
    assert_eq!(summary.report.summary.completed_tasks, 6);

    let results = orchestrator.registry().results();
    let first_batch_end = results[..5]
        .iter()
        .map(|s| s.end_time.expect("terminal"))
        .max()
        .expect("first batch");
    let second_start = results[5].start_time;

    let gap = (second_start - first_batch_end)
        .to_std()
        .expect("second batch starts after first batch settles");
    assert!(gap >= delay, "gap {gap:?} shorter than delay {delay:?}");
}

#[tokio::test]
#[serial]
async fn concurrency_never_exceeds_limit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 2, 5_000, 500);

    let tasks = (0..5)
        .map(|i| sh_task(&format!("t{i}"), "sleep 0.2", 200, temp.path()))
        .collect();
    let orchestrator = Orchestrator::new(shared(config));

    let registry = orchestrator.registry().clone();
    let stop = CancellationToken::new();
    let sampler_stop = stop.clone();
    let sampler = tokio::spawn(async move {
        let mut max_seen = 0;
        loop {
            max_seen = max_seen.max(registry.non_terminal_count());
            tokio::select! {
                () = sampler_stop.cancelled() => break,
                () = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
        max_seen
    });

    let summary = orchestrator.execute(tasks).await.expect("run succeeds");
    stop.cancel();
    let max_seen = sampler.await.expect("sampler");

    assert_eq!(summary.report.summary.completed_tasks, 5);
    assert!(max_seen <= 2, "observed {max_seen} concurrent sessions");
    assert!(max_seen >= 1);
}

#[tokio::test]
async fn launch_failure_is_isolated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 5_000, 500);

    let broken = SessionTask::new(
        "broken",
        "broken worker",
        CommandSpec::new(
            "/nonexistent/agent-batch-worker",
            Vec::new(),
            temp.path().to_path_buf(),
        ),
        100,
    );
    let tasks = vec![
        sh_task("ok", "exit 0", 100, temp.path()),
        broken,
        sh_task("fails", "exit 1", 100, temp.path()),
    ];
    let orchestrator = Orchestrator::new(shared(config));
    let summary = orchestrator.execute(tasks).await.expect("run succeeds");

    let s = &summary.report.summary;
    assert_eq!(s.total_tasks, 3);
    assert_eq!(s.error_tasks, 1);
    assert_eq!(s.completed_tasks, 1);
    assert_eq!(s.failed_tasks, 1);

    let broken = orchestrator.registry().get("broken").expect("broken");
    assert_eq!(broken.status, SessionStatus::Error);
    assert!(!broken.error.expect("message").is_empty());
}

#[tokio::test]
async fn every_task_yields_exactly_one_result() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 3, 300, 200);

    let mut tasks: Vec<SessionTask> = (0..7)
        .map(|i| sh_task(&format!("t{i}"), &format!("exit {}", i % 2), 0, temp.path()))
        .collect();
    tasks.push(sh_task("hung", "exec sleep 30", 0, temp.path()));
    tasks.push(SessionTask::new(
        "missing",
        "missing",
        CommandSpec::new("/nonexistent/worker", Vec::new(), temp.path().to_path_buf()),
        0,
    ));
    let expected: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();

    let orchestrator = Orchestrator::new(shared(config));
    let summary = orchestrator.execute(tasks).await.expect("run succeeds");

    let results = orchestrator.registry().results();
    let ids: HashSet<String> = results.iter().map(|s| s.id.clone()).collect();
    assert_eq!(results.len(), expected.len());
    assert_eq!(ids, expected);
    assert!(results.iter().all(|s| s.status.is_terminal()));

    let s = &summary.report.summary;
    assert_eq!(s.completed_tasks + s.failed_tasks + s.error_tasks, s.total_tasks);
    assert_eq!(
        s.total_duration_ms,
        results.iter().filter_map(|r| r.duration_ms).sum::<u64>()
    );

    // Guard termination is counted in the failed bucket.
    let hung = orchestrator.registry().get("hung").expect("hung");
    assert_eq!(hung.status, SessionStatus::Terminated);
    assert_eq!(s.failed_tasks, 3 + 1);
    assert_eq!(s.error_tasks, 1);
}

#[tokio::test]
async fn driver_failure_is_returned_after_cleanup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(temp.path(), 5, 5_000, 500);
    // A regular file where the log directory should be.
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, "x").expect("write blocker");
    config.paths.log_dir = blocker.join("logs");

    let orchestrator = Orchestrator::new(shared(config));
    let err = orchestrator
        .execute(vec![sh_task("t0", "exit 0", 100, temp.path())])
        .await
        .expect_err("driver fails");

    assert!(matches!(err, AppError::Io(_)), "{err}");
    assert!(orchestrator.registry().snapshot().is_empty());
}

#[tokio::test]
async fn duplicate_task_ids_are_rejected_before_launch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 5_000, 500);
    let scratch = config.paths.scratch_dir.clone();

    let orchestrator = Orchestrator::new(shared(config));
    let err = orchestrator
        .execute(vec![
            sh_task("dup", "exit 0", 100, temp.path()),
            sh_task("dup", "exit 1", 100, temp.path()),
        ])
        .await
        .expect_err("duplicate ids rejected");

    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("duplicate task id: dup")), "{err}");
    assert!(orchestrator.registry().snapshot().is_empty());
    assert_eq!(orchestrator.registry().result_count(), 0);
    assert!(!scratch.exists());
}

#[tokio::test]
async fn path_like_task_ids_are_rejected_before_launch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 5_000, 500);

    let orchestrator = Orchestrator::new(shared(config));
    let err = orchestrator
        .execute(vec![sh_task("nested/t0", "exit 0", 100, temp.path())])
        .await
        .expect_err("path separator rejected");

    assert!(matches!(err, AppError::Config(_)), "{err}");
    assert!(orchestrator.registry().snapshot().is_empty());
}

#[tokio::test]
async fn running_session_can_be_cancelled_mid_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), 5, 30_000, 500);
    let orchestrator = Arc::new(Orchestrator::new(shared(config)));

    let runner = Arc::clone(&orchestrator);
    let run = tokio::spawn(async move {
        runner
            .execute(vec![
                sh_task("stuck", "exec sleep 30", 30_000, temp.path()),
                sh_task("quick", "exit 0", 100, temp.path()),
            ])
            .await
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let active = orchestrator.active_sessions();
        if active.iter().any(|s| s.id == "stuck" && s.status == SessionStatus::Running) {
            assert!(active.iter().all(|s| !s.status.is_terminal()));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "session never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(orchestrator.cancel_session("stuck").expect("cancel"));
    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run finishes after cancel")
        .expect("join")
        .expect("run succeeds");

    assert_eq!(summary.report.summary.completed_tasks, 1);
    assert_eq!(summary.report.summary.failed_tasks, 1);
    assert!(orchestrator.active_sessions().is_empty());
}
