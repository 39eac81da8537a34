//! Report persistence.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::{ExecutionReport, ReportAggregator};
use crate::models::session::SessionInfo;
use crate::{AppError, Result};

/// Write `report` as pretty JSON to `path`, creating missing parent
/// directories.
///
/// # Errors
///
/// Returns `AppError::Report` if serialization fails or the file cannot be
/// written.
pub fn persist(report: &ExecutionReport, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::Report(format!(
                "failed to create report directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    let body = serde_json::to_string_pretty(report)?;
    fs::write(path, body)
        .map_err(|err| AppError::Report(format!("failed to write {}: {err}", path.display())))?;
    Ok(path.to_path_buf())
}

/// Build the report from `results` and persist it to `path`.
///
/// A persistence failure is logged and reported as `None`; the in-memory
/// report is returned either way.
pub fn aggregate_and_persist(
    results: &[SessionInfo],
    path: &Path,
) -> (ExecutionReport, Option<PathBuf>) {
    let report = ReportAggregator::build(results);
    match persist(&report, path) {
        Ok(written) => {
            info!(path = %written.display(), "execution report written");
            (report, Some(written))
        }
        Err(err) => {
            error!(%err, "failed to persist execution report");
            (report, None)
        }
    }
}
