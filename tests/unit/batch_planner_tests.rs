use std::path::PathBuf;

use agent_batch::models::task::{CommandSpec, SessionTask};
use agent_batch::orchestrator::batch_planner::partition;

fn tasks(n: usize) -> Vec<SessionTask> {
    (0..n)
        .map(|i| {
            SessionTask::new(
                format!("t{i}"),
                format!("task {i}"),
                CommandSpec::new("true", Vec::new(), PathBuf::from(".")),
                100,
            )
            // Descending priority: must not affect ordering.
            .with_priority(u32::try_from(n - i).unwrap())
        })
        .collect()
}

fn ids(batch: &agent_batch::orchestrator::batch_planner::Batch) -> Vec<&str> {
    batch.tasks.iter().map(|t| t.id.as_str()).collect()
}

#[test]
fn five_tasks_fit_one_batch() {
    let batches = partition(tasks(5), 5);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 5);
    assert_eq!(batches[0].index, 0);
}

#[test]
fn six_tasks_split_five_then_one() {
    let batches = partition(tasks(6), 5);
    assert_eq!(batches.len(), 2);
    assert_eq!(ids(&batches[0]), vec!["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(ids(&batches[1]), vec!["t5"]);
    assert_eq!(batches[1].index, 1);
}

#[test]
fn preserves_order_and_ignores_priority() {
    let batches = partition(tasks(7), 3);
    let flat: Vec<_> = batches.iter().flat_map(ids).collect();
    assert_eq!(flat, vec!["t0", "t1", "t2", "t3", "t4", "t5", "t6"]);
    assert_eq!(
        batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![3, 3, 1]
    );
}

#[test]
fn no_batch_exceeds_limit() {
    for n in 0..20 {
        for limit in 1..7 {
            let batches = partition(tasks(n), limit);
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= limit));
            assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), n);
        }
    }
}

#[test]
fn empty_input_yields_no_batches() {
    assert!(partition(Vec::new(), 5).is_empty());
}

#[test]
fn zero_limit_is_treated_as_one() {
    let batches = partition(tasks(3), 0);
    assert_eq!(batches.len(), 3);
}
