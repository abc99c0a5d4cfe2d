pub mod cleaner;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod exporter;
pub mod formatter;
pub mod models;
pub mod query;
pub mod tracker;
pub mod trend;

pub use crate::config::MetricsConfig;
pub use crate::db::Database;
pub use crate::errors::{AppError, AppResult};
pub use crate::tracker::{Job, JobDescriptor, JobHarness, JobMiddleware, MetricTracker, ProcessMemoryProbe};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Human-readable logs on stderr, plus daily JSON files when `log_dir` is set.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_layer = match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "jobs-metrics.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(non_blocking).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| error.to_string())
}
