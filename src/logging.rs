//! Logging setup for agentmesh using tracing.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingSettings;

/// Initialize console logging and, if configured, a daily-rolling log file.
///
/// `RUST_LOG` takes precedence over the configured directive. The returned
/// guard must be held for the file writer to flush.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true);

    let (file_layer, guard, log_dir) = if settings.file {
        let log_dir = match &settings.dir {
            Some(dir) => dir.clone(),
            None => get_log_dir()?,
        };
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "agentmesh.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed();
        (Some(layer), Some(guard), Some(log_dir))
    } else {
        (None, None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        tracing::info!("Log directory: {}", dir.display());
    }

    Ok(guard)
}

/// Get the default log directory path.
fn get_log_dir() -> Result<PathBuf> {
    Ok(crate::config::get_home_dir()?.join("logs"))
}

/// Initialize logging for tests (console only, no file). Safe to call repeatedly.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
