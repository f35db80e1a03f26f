//! Logging setup for the embedding target process.
//!
//! The engine is a library, so the target decides where its log lines go:
//! pass a file path (created on demand, appended across restarts) or
//! nothing for stderr. [`default_log_path`] sits next to the default job
//! store so one state directory holds both.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,odm_core=debug"))
}

/// Default log location: `~/.local/state/odm/engine.log`, alongside the
/// default job store database.
pub fn default_log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("odm")?;
    Ok(xdg_dirs.get_state_home().join("odm").join("engine.log"))
}

/// Initialize structured logging for the process. With a path, lines are
/// appended to that file; without one, they go to stderr. Returns Err when
/// the file cannot be opened so the caller can fall back to
/// `init_logging(None)` instead of crashing the target.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    tracing::info!("download engine logging to {}", path.display());
    Ok(())
}
