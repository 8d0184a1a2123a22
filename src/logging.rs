//! Logging setup for host applications embedding the store.
//!
//! The store only emits `tracing` events and never installs a subscriber.
//! Hosts without one of their own call [`init_from`] once at startup.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::StoreConfig;

/// Environment variable holding the log filter, e.g. `DMAP_LOG=debug`.
pub const LOG_ENV: &str = "DMAP_LOG";

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBackend {
    Journald,
    File(PathBuf),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber described by `config`.
///
/// Journald is used on Linux when its socket is reachable. Otherwise logs
/// roll daily under `config.log_dir`, or the local data directory when that
/// is unset. Fails if a global subscriber is already installed.
pub fn init_from(config: &StoreConfig) -> Result<LogBackend> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer)
                .try_init()
                .context("A global tracing subscriber is already installed")?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(LogBackend::Journald);
        }
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(default_log_dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "dmap-local-storage.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    // The writer thread flushes until the guard drops; keep it for the process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing::info!(dir = %log_dir.display(), "Logging initialized with file backend");
    Ok(LogBackend::File(log_dir))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dmap")
        .join("logs")
}
