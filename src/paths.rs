//! Path resolution for tidyup
//!
//! # Environment Variables
//!
//! - `TIDYUP_CONFIG_DIR` - Override config directory
//! - `TIDYUP_STATE_DIR` - Override state directory
//! - `TIDYUP_BACKUP_DIR` - Override the backup root (wins over `backup_root` in config)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `TIDYUP_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/tidyup` (if set)
//! 3. `~/.config/tidyup`
//!
//! For state_dir():
//! 1. `TIDYUP_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/tidyup` (if set)
//! 3. `~/.local/state/tidyup`
//!
//! Backups default to `<state_dir>/backups`.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "TIDYUP_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "TIDYUP_STATE_DIR";

/// Environment variable for backup root override
pub const ENV_BACKUP_DIR: &str = "TIDYUP_BACKUP_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the tidyup config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("tidyup");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("tidyup");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the tidyup state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("tidyup");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("tidyup");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Resolve the backup root.
///
/// Priority: `TIDYUP_BACKUP_DIR`, then the configured value, then `<state_dir>/backups`.
pub fn backup_root(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_BACKUP_DIR) {
        let path = expand(&dir);
        log::debug!("Using backup root from {}: {}", ENV_BACKUP_DIR, path.display());
        return Ok(path);
    }

    if let Some(dir) = configured {
        return Ok(expand(dir));
    }

    Ok(state_dir()?.join("backups"))
}

/// Default config file location
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
