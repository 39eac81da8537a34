//! Session orchestration modules.
//!
//! Covers batch planning, worker process launching and output capture,
//! timeout escalation, status monitoring, completion waiting, cleanup, and
//! the top-level driver that ties them together.

pub mod batch_planner;
pub mod cleanup;
pub mod completion;
pub mod launcher;
pub mod registry;
pub mod runner;
pub mod session_log;
pub mod signals;
pub mod status_monitor;
pub mod timeout_guard;
