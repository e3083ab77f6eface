//! Logging configuration using tracing.
//!
//! Command output goes to stdout, so log lines are written to a daily
//! rolling file under the user data directory instead.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log directory: `<data_dir>/jira-soap/logs`.
pub fn default_log_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .unwrap_or_else(std::env::temp_dir)
    .join("jira-soap")
    .join("logs")
}

/// Initialize the tracing subscriber.
///
/// Filtering follows RUST_LOG and defaults to "warn". The returned guard
/// flushes buffered lines on drop and must be held for the program lifetime.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "jira-soap.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

  Ok(guard)
}
