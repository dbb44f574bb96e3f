pub mod cli;
pub mod config;
pub mod dataset;
pub mod db;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod models;
pub mod policy;
pub mod queries;
pub mod seed;

pub use crate::dataset::{load, Dataset, DatasetSource};
pub use crate::engine::QueryEngine;
pub use crate::errors::{AppError, AppResult};

use crate::cli::Cli;
use crate::config::AppConfig;
use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Process exit status for a failed command: 2 for rejections the user can act
/// on, 3 for startup failures, 1 for anything else.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<AppError>() {
        Some(app_error) if app_error.is_recoverable() => 2,
        Some(AppError::Load(_)) | Some(AppError::Config(_)) => 3,
        _ => 1,
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::resolve(cli.overrides())?;
    init_tracing(config.log_dir.as_deref()).context("failed to initialise logging")?;
    tracing::debug!(dataset = %config.dataset, max_rows = config.limits.max_rows, "starting");

    let engine = QueryEngine::load(&config.dataset, config.limits)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let output = block_on_bounded(runtime, cli::dispatch(&engine, &cli.command))?;
    println!("{}", output);
    Ok(())
}

/// Drives `future` to completion, then shuts the runtime down without waiting
/// more than [`SHUTDOWN_GRACE`] for blocking workers that are still running.
fn block_on_bounded<F: Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

fn init_tracing(log_dir: Option<&Path>) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "xbrl-lookup.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
