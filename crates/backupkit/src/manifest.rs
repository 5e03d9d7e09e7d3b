//! Per-session manifest: structured JSON plus legacy migration
//!
//! The manifest is append-only. Every append rewrites the file through a
//! temporary sibling and a rename, so a crash leaves either the previous or
//! the new version at the canonical name. There is exactly one writer per
//! session (the backup engine), so no locking is involved.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fsutil::{checksum_file, write_atomic};
use crate::types::{ArtifactType, Manifest, ManifestEntry};

/// Structured manifest file name inside a session directory
pub const MANIFEST_FILE: &str = "backup_manifest.json";

/// Legacy pipe-delimited manifest file name
pub const LEGACY_MANIFEST_FILE: &str = "backup_manifest.txt";

/// Current structured format version
pub const FORMAT_VERSION: u32 = 2;

/// Extensions that mark a legacy artifact as a directory archive
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar"];

/// Handle to one session's structured manifest
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create an empty manifest with a header unless one already exists
    pub fn init(&self, session_id: &str, created_at: &str) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            session_id: session_id.to_string(),
            created_at: created_at.to_string(),
            entries: Vec::new(),
        };
        self.write(&manifest)
    }

    /// Append one entry. The manifest must have been initialized.
    pub fn append(&self, entry: ManifestEntry) -> Result<()> {
        let mut manifest = self.read()?;
        manifest.entries.push(entry);
        self.write(&manifest)?;
        log::debug!(
            "Manifest {} now has {} entries",
            self.path.display(),
            manifest.entries.len()
        );
        Ok(())
    }

    /// Read and validate the whole manifest
    pub fn read(&self) -> Result<Manifest> {
        let content = fs::read_to_string(&self.path)?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| Error::ManifestCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::ManifestCorrupt {
                path: self.path.clone(),
                reason: format!("unsupported format version {}", manifest.format_version),
            });
        }
        Ok(manifest)
    }

    /// Entries in the order they were recorded
    pub fn entries(&self) -> Result<Vec<ManifestEntry>> {
        Ok(self.read()?.entries)
    }

    fn write(&self, manifest: &Manifest) -> Result<()> {
        let mut content = serde_json::to_string_pretty(manifest)?;
        content.push('\n');
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }
}

/// Read the entries of a structured manifest
pub fn read(path: &Path) -> Result<Vec<ManifestEntry>> {
    ManifestStore::new(path).entries()
}

/// A parsed `original_path|backup_name|timestamp` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRecord {
    pub original_path: PathBuf,
    pub backup_name: String,
    pub timestamp: String,
}

/// Parse the legacy format. Blank, comment and malformed lines are skipped.
pub fn parse_legacy(content: &str) -> Vec<LegacyRecord> {
    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // original paths may themselves contain '|', so split from the right
        let mut parts = line.rsplitn(3, '|');
        let (Some(timestamp), Some(backup_name), Some(original)) =
            (parts.next(), parts.next(), parts.next())
        else {
            log::warn!("Skipping malformed legacy manifest line {}: {line}", lineno + 1);
            continue;
        };
        if original.is_empty() || backup_name.is_empty() {
            log::warn!("Skipping incomplete legacy manifest line {}: {line}", lineno + 1);
            continue;
        }

        records.push(LegacyRecord {
            original_path: PathBuf::from(original),
            backup_name: backup_name.to_string(),
            timestamp: timestamp.to_string(),
        });
    }
    records
}

/// Infer artifact type from the legacy backup name
fn legacy_artifact(backup_name: &str) -> (String, ArtifactType) {
    for ext in ARCHIVE_EXTENSIONS {
        if let Some(stem) = backup_name.strip_suffix(ext) {
            return (stem.to_string(), ArtifactType::Directory);
        }
    }
    (backup_name.to_string(), ArtifactType::File)
}

/// Migrate a legacy manifest into the structured format.
///
/// Entries already present in `new_path` are not duplicated, so migrating the
/// same legacy file twice yields an identical manifest. The legacy file is
/// never touched. Returns the number of entries in the structured manifest.
pub fn migrate_legacy(old_path: &Path, new_path: &Path, session_id: &str) -> Result<usize> {
    let content = fs::read_to_string(old_path)?;
    let records = parse_legacy(&content);
    let session_dir = old_path.parent().unwrap_or_else(|| Path::new("."));

    let store = ManifestStore::new(new_path);
    let mut manifest = if store.exists() {
        store.read()?
    } else {
        Manifest {
            format_version: FORMAT_VERSION,
            session_id: session_id.to_string(),
            created_at: records
                .first()
                .map(|r| r.timestamp.clone())
                .unwrap_or_default(),
            entries: Vec::new(),
        }
    };

    let mut seen: HashSet<(PathBuf, String)> = manifest
        .entries
        .iter()
        .map(|e| (e.original_path.clone(), e.artifact.clone()))
        .collect();

    let mut added = 0;
    for record in records {
        let artifact = record.backup_name.clone();
        if !seen.insert((record.original_path.clone(), artifact.clone())) {
            continue;
        }

        let (backup_name, artifact_type) = legacy_artifact(&record.backup_name);
        let artifact_path = session_dir.join(&artifact);
        let (size_bytes, checksum) = match fs::metadata(&artifact_path) {
            Ok(meta) => (meta.len(), checksum_file(&artifact_path).unwrap_or_default()),
            Err(_) => (0, String::new()),
        };

        manifest.entries.push(ManifestEntry {
            original_path: record.original_path,
            backup_name,
            artifact,
            artifact_type,
            size_bytes,
            checksum,
            timestamp: record.timestamp,
        });
        added += 1;
    }

    store.write(&manifest)?;
    log::info!(
        "Migrated {} legacy entries from {} into {}",
        added,
        old_path.display(),
        new_path.display()
    );
    Ok(manifest.entries.len())
}

/// Check that every distinct record of the legacy file made it into `new_path`
pub fn confirm_migration(old_path: &Path, new_path: &Path) -> Result<()> {
    let expected: HashSet<(PathBuf, String)> = parse_legacy(&fs::read_to_string(old_path)?)
        .into_iter()
        .map(|r| (r.original_path, r.backup_name))
        .collect();
    let migrated: HashSet<(PathBuf, String)> = read(new_path)?
        .into_iter()
        .map(|e| (e.original_path, e.artifact))
        .collect();

    let missing = expected.difference(&migrated).count();
    if missing > 0 {
        return Err(Error::ManifestCorrupt {
            path: new_path.to_path_buf(),
            reason: format!(
                "{missing} of {} legacy records missing after migration",
                expected.len()
            ),
        });
    }
    Ok(())
}
