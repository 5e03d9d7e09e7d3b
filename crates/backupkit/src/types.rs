//! Data types for the backupkit crate

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of artifact stored for a backed-up path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Byte-for-byte copy
    File,
    /// gzip-compressed tar of the directory contents
    Directory,
}

/// One backed-up path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_path: PathBuf,
    pub backup_name: String,
    /// File name of the artifact inside the session directory
    pub artifact: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub size_bytes: u64,
    /// BLAKE3 hex digest of the artifact (empty when migrated without one)
    pub checksum: String,
    pub timestamp: String,
}

/// Structured manifest file: header plus ordered entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub session_id: String,
    pub created_at: String,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

/// Result of a backup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Artifact written, verified and recorded
    Created(ManifestEntry),
    /// Directory below the minimum size; skip recorded in the session log
    SkippedTooSmall { size: u64 },
}

/// Result of a safe removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Nothing existed at the path
    Missing,
    /// Backed up (or skipped as too small) and removed
    Removed { backup: BackupOutcome, freed: u64 },
}

/// Outcome of restoring a single manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Restored,
    Failed { reason: String },
}

/// Per-entry restore result
#[derive(Debug, Clone)]
pub struct EntryResult {
    pub original_path: PathBuf,
    pub artifact: String,
    pub outcome: EntryOutcome,
}

/// Summary of a restore run
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: usize,
    pub results: Vec<EntryResult>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
