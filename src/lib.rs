#![forbid(unsafe_code)]

//! `agent-batch` runs external worker sessions in bounded concurrent
//! batches and produces a consolidated execution report.

pub mod config;
pub mod errors;
pub mod manifest;
pub mod models;
pub mod orchestrator;
pub mod report;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
