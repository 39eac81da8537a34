//! Fixed-size batch partitioning.

use crate::models::task::SessionTask;

/// A group of tasks launched together and fully awaited before the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Zero-based position of this batch in the run.
    pub index: usize,
    /// Tasks in their original order.
    pub tasks: Vec<SessionTask>,
}

impl Batch {
    /// Number of tasks in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the batch holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Split `tasks` into consecutive batches of at most `max_concurrent_sessions`.
///
/// Order is preserved and the last batch may be shorter. Tasks are not
/// reordered by priority. A limit of zero is treated as one.
#[must_use]
pub fn partition(tasks: Vec<SessionTask>, max_concurrent_sessions: usize) -> Vec<Batch> {
    let size = max_concurrent_sessions.max(1);
    let mut batches = Vec::with_capacity(tasks.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);

    for task in tasks {
        current.push(task);
        if current.len() == size {
            batches.push(Batch {
                index: batches.len(),
                tasks: std::mem::replace(&mut current, Vec::with_capacity(size)),
            });
        }
    }
    if !current.is_empty() {
        batches.push(Batch {
            index: batches.len(),
            tasks: current,
        });
    }

    batches
}
