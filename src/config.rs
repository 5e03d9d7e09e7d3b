//! `config.toml` settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use crate::ui;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where backup sessions are written (`TIDYUP_BACKUP_DIR` wins)
    pub backup_root: Option<String>,
    /// Directories smaller than this are deleted without an archive ("500KB", "1MB", ...)
    pub min_backup_size: String,
    pub operation_timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL for a timed-out or interrupted worker
    pub kill_grace_secs: u64,
    /// Concurrent size-estimation children
    pub sweep_jobs: usize,
    /// Sessions kept after a successful run
    pub retention: usize,
    pub progress_interval_ms: u64,
    pub lock: LockSettings,
    /// Register the built-in cache plugins
    pub builtin_plugins: bool,
    pub plugins: Vec<PluginConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_root: None,
            min_backup_size: "1MB".to_string(),
            operation_timeout_secs: 30 * 60,
            kill_grace_secs: 5,
            sweep_jobs: std::thread::available_parallelism()
                .map(|n| n.get().min(8))
                .unwrap_or(4),
            retention: 10,
            progress_interval_ms: 200,
            lock: LockSettings::default(),
            builtin_plugins: true,
            plugins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Lock files older than this are treated as abandoned
    pub stale_after_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            retries: 50,
            retry_delay_ms: 20,
            stale_after_secs: 300,
        }
    }
}

impl LockSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// A `[[plugins]]` table: a named list of paths to clean
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub requires_admin: bool,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_category() -> String {
    "applications".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist; the default `config.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = paths::config_file()?;
                if !path.exists() {
                    log::debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        settings.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.min_backup_bytes()?;
        if self.sweep_jobs == 0 {
            anyhow::bail!("sweep_jobs must be at least 1");
        }
        if self.operation_timeout_secs == 0 {
            anyhow::bail!("operation_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn min_backup_bytes(&self) -> Result<u64> {
        ui::parse_size(&self.min_backup_size)
            .map_err(|e| anyhow::anyhow!("min_backup_size: {e}"))
    }

    pub fn backup_root(&self) -> Result<PathBuf> {
        paths::backup_root(self.backup_root.as_deref())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
