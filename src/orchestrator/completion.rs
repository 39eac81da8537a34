//! Level-triggered wait for global completion.

use std::time::Duration;

use tracing::debug;

use super::registry::SessionRegistry;

/// Poll `registry` every `poll_interval` until no session is non-terminal.
pub async fn wait_for_completion(registry: &SessionRegistry, poll_interval: Duration) {
    loop {
        let outstanding = registry.non_terminal_count();
        if outstanding == 0 {
            return;
        }
        debug!(outstanding, "waiting for outstanding sessions");
        tokio::time::sleep(poll_interval).await;
    }
}
