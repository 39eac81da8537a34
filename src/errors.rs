//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all orchestration failure modes.
///
/// Individual session failures are not errors at this level; they are
/// recorded as [`crate::models::session::SessionStatus`] values instead.
#[derive(Debug)]
pub enum AppError {
    /// Configuration or task manifest parsing/validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Worker process could not be started or its input materialized.
    Launch(String),
    /// Report serialization or persistence failure.
    Report(String),
    /// The run was interrupted by a shutdown signal.
    Interrupted(String),
    /// No session is registered under the requested id.
    NotFound(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Report(msg) => write!(f, "report: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Report(format!("serialization failed: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
