//! Plugin trait and the execution context handed to it
//!
//! A plugin is a typed object; its catalog name is only a lookup key for
//! selection menus and worker dispatch.

use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// What happened when a plugin asked to remove a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Path was backed up (or skipped as too small) and then removed
    Removed { freed: u64 },
    /// Nothing at this path
    Missing,
    /// Backup failed, so the path was left untouched
    Protected { reason: String },
}

/// Services a running plugin may use
///
/// Implemented by the worker process. Removal always goes through the
/// backup engine, so a plugin never deletes anything on its own.
pub trait ExecContext {
    /// Back up `path` and remove it. Never deletes without a backup record.
    fn remove(&mut self, path: &Path, logical_name: &str) -> Removal;

    /// Report intra-operation progress (e.g. "path 2 of 5")
    fn report_items(&mut self, current: u64, total: u64, label: &str);

    /// Record bytes freed by this operation; may be called many times
    fn record_freed(&mut self, bytes: u64);
}

/// A cleanup operation
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Whether this plugin has anything to execute.
    ///
    /// Plugins reporting `false` are refused at registration.
    fn is_runnable(&self) -> bool;

    /// Whether `estimate_size` produces a value
    fn has_estimator(&self) -> bool {
        false
    }

    /// Estimated reclaimable bytes, or `None` when the plugin has no estimator
    fn estimate_size(&self) -> Option<u64> {
        None
    }

    /// Run the operation
    fn execute(&self, ctx: &mut dyn ExecContext) -> Result<()>;
}

/// Catalog entry for a plugin
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Lookup key (normalized on registration)
    pub name: String,
    /// Free-form category used to build selection menus
    pub category: String,
    pub plugin: Arc<dyn Plugin>,
    pub requires_admin: bool,
    pub version: String,
    /// Names of plugins that must run before this one when both are selected
    pub dependencies: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, category: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            plugin,
            requires_admin: false,
            version: "1.0.0".to_string(),
            dependencies: Vec::new(),
        }
    }

    pub fn requires_admin(mut self, requires_admin: bool) -> Self {
        self.requires_admin = requires_admin;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a size estimator is available for this plugin
    pub fn has_estimator(&self) -> bool {
        self.plugin.has_estimator()
    }
}
