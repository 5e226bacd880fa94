mod types;

pub use types::*;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable that overrides `stream.endpoint`.
pub const ENDPOINT_ENV: &str = "GYRO_DASH_SERVER_URL";

/// Returns the config directory: <config_dir>/gyro-dashboard/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("gyro-dashboard");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <config_dir>/gyro-dashboard/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from disk, or return default if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Load config from `path`. A missing file yields defaults; an unreadable
/// or malformed one is an error and the file is left untouched.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!("No config found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Save config to disk.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}

/// Endpoint to connect to: `GYRO_DASH_SERVER_URL` if set, else the config file.
pub fn stream_endpoint(config: &StreamConfig) -> Option<String> {
    resolve_endpoint(config.endpoint.clone(), std::env::var(ENDPOINT_ENV).ok())
}

/// Pick the endpoint: a non-blank environment value wins over the file.
/// Blank values count as unset.
pub fn resolve_endpoint(from_file: Option<String>, from_env: Option<String>) -> Option<String> {
    let clean = |v: Option<String>| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    clean(from_env).or_else(|| clean(from_file))
}
