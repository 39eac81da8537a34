#![forbid(unsafe_code)]

//! `agent-batch` batch orchestrator binary.
//!
//! Loads the configuration and task manifest, runs every task through the
//! orchestrator, and prints the report location and success rate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_batch::manifest::TaskManifest;
use agent_batch::orchestrator::runner::{Orchestrator, RunSummary};
use agent_batch::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-batch", about = "Batch orchestrator for agent worker sessions", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Path to the TOML task manifest.
    #[arg(long)]
    tasks: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    info!("agent-batch bootstrap");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match result {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "agent-batch failed");
            eprintln!("\u{1f4a5} orchestration failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<RunSummary> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    let tasks = TaskManifest::load_from_path(&args.tasks)?.into_tasks(&config);
    info!(tasks = tasks.len(), "configuration loaded");

    // ── Run until done or interrupted ───────────────────
    let orchestrator = Orchestrator::new(Arc::clone(&config));
    tokio::select! {
        result = orchestrator.execute(tasks) => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            orchestrator.cleanup();
            Err(AppError::Interrupted("shutdown signal received".into()))
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let report = &summary.report;
    match &summary.report_path {
        Some(path) => println!("\u{1f4c4} report: {}", path.display()),
        None => println!("\u{26a0}\u{fe0f} report could not be written"),
    }
    println!(
        "\u{1f4ca} {}/{} completed ({:.1}% success), {} failed, {} errors",
        report.summary.completed_tasks,
        report.summary.total_tasks,
        report.success_rate(),
        report.summary.failed_tasks,
        report.summary.error_tasks,
    );
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
