//! Unit tests for the global completion wait.

use std::path::PathBuf;
use std::time::Duration;

use agent_batch::models::session::SessionStatus;
use agent_batch::models::task::{CommandSpec, SessionTask};
use agent_batch::orchestrator::completion::wait_for_completion;
use agent_batch::orchestrator::registry::{Completion, SessionRegistry};

fn task(id: &str) -> SessionTask {
    SessionTask::new(
        id,
        id,
        CommandSpec::new("true", Vec::new(), PathBuf::from(".")),
        100,
    )
}

#[tokio::test]
async fn returns_immediately_when_registry_is_empty() {
    let registry = SessionRegistry::new();
    tokio::time::timeout(
        Duration::from_millis(100),
        wait_for_completion(&registry, Duration::from_secs(60)),
    )
    .await
    .expect("no outstanding sessions");
}

#[tokio::test]
async fn waits_until_last_session_settles() {
    let registry = SessionRegistry::new();
    registry.register(&task("a"));
    registry.register(&task("b"));
    registry.mark_running("a", Some(1));
    registry.mark_running("b", Some(2));
    registry.finish("a", Completion::new(SessionStatus::Completed));

    let finisher = registry.clone();
    let settle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        finisher.finish("b", Completion::new(SessionStatus::Failed));
    });

    tokio::time::timeout(
        Duration::from_secs(2),
        wait_for_completion(&registry, Duration::from_millis(10)),
    )
    .await
    .expect("wait ends once every session is terminal");

    settle.await.expect("finisher");
    assert_eq!(registry.non_terminal_count(), 0);
}

#[tokio::test]
async fn keeps_waiting_while_sessions_are_outstanding() {
    let registry = SessionRegistry::new();
    registry.register(&task("a"));

    let waited = tokio::time::timeout(
        Duration::from_millis(100),
        wait_for_completion(&registry, Duration::from_millis(10)),
    )
    .await;
    assert!(waited.is_err());
}
