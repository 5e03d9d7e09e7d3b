//! Backup engine: verified artifacts before anything is deleted
//!
//! Each artifact is written under a hidden `.<artifact>.tmp` name, verified,
//! and only then renamed into place. A crash at any point leaves either
//! nothing or a complete artifact at the canonical name. Hidden leftovers
//! are ignored by restore and never collide with artifact names.

use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fsutil::{self, checksum_file, ensure_space, freed_between, path_size, remove_contents};
use crate::session::Session;
use crate::types::{ArtifactType, BackupOutcome, ManifestEntry, RemoveOutcome};

/// Directories below this size are not backed up (1 MiB)
pub const DEFAULT_MIN_BACKUP_SIZE: u64 = 1024 * 1024;

/// Archive extension for directory artifacts
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Backup policy
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Directories smaller than this are skipped (recorded, not backed up)
    pub min_backup_size: u64,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            min_backup_size: DEFAULT_MIN_BACKUP_SIZE,
        }
    }
}

/// Creates artifacts in one session and records them in its manifest
#[derive(Debug, Clone)]
pub struct BackupEngine {
    session: Session,
    options: BackupOptions,
}

impl BackupEngine {
    pub fn new(session: Session, options: BackupOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Back up `path` under `logical_name`.
    ///
    /// On success the artifact exists at its final name, verified, with a
    /// manifest entry. On failure nothing is recorded and no in-progress file is left.
    pub fn create_backup(&self, path: &Path, logical_name: &str) -> Result<BackupOutcome> {
        let meta = fs::symlink_metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::PathNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let artifact_type = if meta.is_dir() {
            ArtifactType::Directory
        } else if meta.is_file() {
            ArtifactType::File
        } else {
            return Err(Error::UnsupportedType(path.to_path_buf()));
        };

        let source_size = path_size(path);
        if artifact_type == ArtifactType::Directory && source_size < self.options.min_backup_size {
            log::info!(
                "Skipping backup of {} ({} bytes < {} minimum)",
                path.display(),
                source_size,
                self.options.min_backup_size
            );
            self.session.audit(&format!(
                "SKIP {} {} bytes (directory too small to back up)",
                path.display(),
                source_size
            ))?;
            return Ok(BackupOutcome::SkippedTooSmall { size: source_size });
        }

        ensure_space(self.session.dir(), path, source_size)?;
        self.session.ensure()?;

        let (backup_name, artifact) = self.artifact_name(path, logical_name, artifact_type);
        let final_path = self.session.dir().join(&artifact);
        let tmp_path = fsutil::tmp_path(&final_path);

        let written = match artifact_type {
            ArtifactType::Directory => write_archive(path, &tmp_path),
            ArtifactType::File => copy_file(path, &tmp_path),
        }
        .and_then(|()| fs::rename(&tmp_path, &final_path).map_err(Error::from));

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            log::error!("Backup of {} failed: {e}", path.display());
            return Err(e);
        }

        let checksum = match checksum_file(&final_path) {
            Ok(sum) => sum,
            Err(e) => {
                let _ = fs::remove_file(&final_path);
                return Err(e.into());
            }
        };

        let entry = ManifestEntry {
            original_path: path.to_path_buf(),
            backup_name,
            artifact,
            artifact_type,
            size_bytes: source_size,
            checksum,
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        };

        if let Err(e) = self.session.manifest().append(entry.clone()) {
            let _ = fs::remove_file(&final_path);
            return Err(e);
        }

        log::info!(
            "Backed up {} -> {}",
            path.display(),
            final_path.display()
        );
        Ok(BackupOutcome::Created(entry))
    }

    /// Back up `path`, then remove it.
    ///
    /// Directories lose their contents but stay in place; files are removed.
    /// Any backup error is returned before anything is deleted.
    pub fn safe_remove(&self, path: &Path, logical_name: &str) -> Result<RemoveOutcome> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RemoveOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        let before = path_size(path);
        let backup = self.create_backup(path, logical_name)?;

        if meta.is_dir() {
            let failures = remove_contents(path);
            if failures > 0 {
                log::warn!("{failures} entries under {} could not be removed", path.display());
            }
        } else {
            fs::remove_file(path)?;
        }

        let after = path_size(path);
        let freed = freed_between(path, before, after);
        // deletion already happened; an audit failure is only logged
        if let Err(e) = self.session.audit(&format!(
            "REMOVE {} freed {} bytes ({logical_name})",
            path.display(),
            freed
        )) {
            log::warn!("Could not write audit line for {}: {e}", path.display());
        }

        Ok(RemoveOutcome::Removed { backup, freed })
    }

    /// `<logical>-<basename>[-N]`, unique within the session directory.
    ///
    /// Sanitized names never start with `.`, so they cannot land on an
    /// in-progress file.
    fn artifact_name(&self, path: &Path, logical_name: &str, kind: ArtifactType) -> (String, String) {
        let base_component = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let base = fsutil::sanitize_name(&format!("{logical_name}-{base_component}"));
        let extension = match kind {
            ArtifactType::Directory => ARCHIVE_EXTENSION,
            ArtifactType::File => "",
        };

        let mut name = base.clone();
        let mut n = 2;
        while self.session.dir().join(format!("{name}{extension}")).exists() {
            name = format!("{base}-{n}");
            n += 1;
        }
        let artifact = format!("{name}{extension}");
        (name, artifact)
    }
}

/// Serialize a directory's contents into a gzip tarball at `dest`, then verify it
fn write_archive(src: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", src)?;
    builder.into_inner()?.finish()?.sync_all()?;

    verify_archive(dest)
}

/// Confirm the archive's listing can be read end to end
pub fn verify_archive(path: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let entries = archive.entries().map_err(|e| verify_error(path, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| verify_error(path, &e))?;
        entry.path().map_err(|e| verify_error(path, &e))?;
    }
    Ok(())
}

fn verify_error(path: &Path, e: &std::io::Error) -> Error {
    Error::VerifyFailed {
        path: path.to_path_buf(),
        reason: format!("unreadable archive listing: {e}"),
    }
}

/// Byte-copy `src` to `dest` and confirm the sizes match
fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let expected = fs::metadata(src)?.len();
    fs::copy(src, dest)?;
    File::open(dest)?.sync_all()?;

    let actual = fs::metadata(dest)?.len();
    if actual != expected {
        return Err(Error::VerifyFailed {
            path: dest.to_path_buf(),
            reason: format!("copied {actual} bytes, source has {expected}"),
        });
    }
    Ok(())
}

/// Directory artifacts are stored with this suffix
pub fn is_archive(artifact: &str) -> bool {
    artifact.ends_with(ARCHIVE_EXTENSION)
}

/// Path of an artifact inside a session directory
pub fn artifact_path(session_dir: &Path, artifact: &str) -> PathBuf {
    session_dir.join(artifact)
}
