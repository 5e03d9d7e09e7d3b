//! Plugins: named path lists, and the catalog built from them

mod builtin;

use anyhow::Result;
use catalog::{Catalog, ExecContext, Plugin, PluginDescriptor, Removal};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{PluginConfig, Settings};
use crate::paths;

pub use builtin::builtin_plugins;

/// Cleans a fixed list of paths: directories are emptied, files removed
#[derive(Debug, Clone)]
pub struct PathPlugin {
    name: String,
    paths: Vec<PathBuf>,
}

impl PathPlugin {
    pub fn new(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            paths,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Plugin for PathPlugin {
    fn is_runnable(&self) -> bool {
        !self.paths.is_empty()
    }

    fn has_estimator(&self) -> bool {
        true
    }

    fn estimate_size(&self) -> Option<u64> {
        Some(
            self.paths
                .par_iter()
                .map(|p| backupkit::fsutil::path_size(p))
                .sum(),
        )
    }

    fn execute(&self, ctx: &mut dyn ExecContext) -> Result<()> {
        let total = self.paths.len() as u64;
        for (i, path) in self.paths.iter().enumerate() {
            ctx.report_items(i as u64, total, &path.display().to_string());
            match ctx.remove(path, &self.name) {
                Removal::Removed { freed } => {
                    log::info!("{}: freed {freed} bytes from {}", self.name, path.display());
                    ctx.record_freed(freed);
                }
                Removal::Missing => log::debug!("{}: {} not present", self.name, path.display()),
                Removal::Protected { reason } => {
                    log::warn!("{}: kept {} ({reason})", self.name, path.display());
                }
            }
        }
        ctx.report_items(total, total, "");
        Ok(())
    }
}

fn descriptor_from_config(config: &PluginConfig) -> PluginDescriptor {
    let paths = config.paths.iter().map(|p| paths::expand(p)).collect();
    PluginDescriptor::new(
        config.name.clone(),
        config.category.clone(),
        Arc::new(PathPlugin::new(catalog::normalize_name(&config.name), paths)),
    )
    .requires_admin(config.requires_admin)
    .version(config.version.clone())
    .depends_on(config.depends_on.clone())
}

/// Build the catalog: built-ins (unless disabled), then `[[plugins]]` from config.
///
/// Config entries with a built-in's name replace it.
pub fn build_catalog(settings: &Settings) -> Catalog {
    let mut catalog = Catalog::new();

    if settings.builtin_plugins {
        for descriptor in builtin_plugins() {
            catalog.register(descriptor);
        }
    }

    for config in &settings.plugins {
        if !catalog.register(descriptor_from_config(config)) {
            log::error!("Plugin '{}' has no paths; skipped", config.name);
        }
    }

    log::debug!("Catalog has {} plugins", catalog.len());
    catalog
}

// ============================================================================
// Tests
// ============================================================================
