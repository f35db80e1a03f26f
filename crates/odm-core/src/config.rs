use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Engine configuration loaded from `~/.config/odm/config.toml`.
///
/// These are target-local tuning knobs; per-job limits arrive with the
/// download request and are tracked separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlConfig {
    /// Worker-pool size for jobs whose request does not bound connections.
    pub default_connections: usize,
    /// Job timeout in seconds for requests that carry none. 0 disables.
    pub job_timeout_secs: u64,
    /// Transport connect timeout, seconds.
    pub connect_timeout_secs: u64,
    /// Transport total per-request timeout, seconds.
    pub request_timeout_secs: u64,
    /// Progress notification interval, seconds.
    pub progress_interval_secs: u64,
}

impl Default for DlConfig {
    fn default() -> Self {
        Self {
            default_connections: 64,
            job_timeout_secs: 0,
            connect_timeout_secs: 30,
            request_timeout_secs: 3600,
            progress_interval_secs: 10,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("odm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
