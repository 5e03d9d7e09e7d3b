//! Error types for the backupkit crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while backing up, recording or restoring
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path does not exist
    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Neither a regular file nor a directory
    #[error("cannot back up {}: not a regular file or directory", .0.display())]
    UnsupportedType(PathBuf),

    /// Backup volume too small for the source
    #[error(
        "not enough space to back up {}: need {required} bytes, {available} available",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// Artifact failed verification after being written
    #[error("verification failed for {}: {reason}", .path.display())]
    VerifyFailed { path: PathBuf, reason: String },

    /// Manifest unreadable or structurally invalid
    #[error("manifest {} is corrupt: {reason}", .path.display())]
    ManifestCorrupt { path: PathBuf, reason: String },

    /// Session cannot be restored automatically; raw artifacts are listed
    #[error("no automatic restore possible for {}: {reason}", .session_dir.display())]
    NoAutomaticRestore {
        session_dir: PathBuf,
        reason: String,
        artifacts: Vec<String>,
    },

    /// Directory name is not a session id
    #[error("invalid session directory: {}", .0.display())]
    InvalidSession(PathBuf),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for backupkit operations
pub type Result<T> = std::result::Result<T, Error>;
