//! Domain models for tasks and their runtime sessions.

pub mod session;
pub mod task;
