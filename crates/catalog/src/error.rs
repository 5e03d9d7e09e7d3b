//! Error types for the catalog crate

use thiserror::Error;

/// Errors raised while resolving plugins from the catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No plugin is registered under this name
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Plugin exists but cannot be used as declared
    #[error("plugin '{name}' is invalid: {reason}")]
    PluginInvalid { name: String, reason: String },
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;
