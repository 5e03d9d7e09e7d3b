//! Restore engine: put a session's artifacts back where they came from

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::fsutil::{checksum_file, is_in_progress};
use crate::manifest::{self, LEGACY_MANIFEST_FILE, MANIFEST_FILE};
use crate::session::{SESSION_LOG, SESSION_LOG_COMPRESSED, Session};
use crate::types::{ArtifactType, EntryOutcome, EntryResult, ManifestEntry, RestoreReport};

/// Restore every entry of `manifest_path` from `session_dir`.
///
/// A failing entry is recorded and the next one is attempted.
pub fn restore(manifest_path: &Path, session_dir: &Path) -> Result<RestoreReport> {
    let entries = manifest::read(manifest_path)?;
    let mut report = RestoreReport::default();

    for entry in entries {
        let outcome = match restore_entry(&entry, session_dir) {
            Ok(()) => {
                log::info!("Restored {}", entry.original_path.display());
                report.restored += 1;
                EntryOutcome::Restored
            }
            Err(e) => {
                log::error!("Failed to restore {}: {e}", entry.original_path.display());
                report.failed += 1;
                EntryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        report.results.push(EntryResult {
            original_path: entry.original_path,
            artifact: entry.artifact,
            outcome,
        });
    }

    Ok(report)
}

/// Restore a session directory, migrating a legacy manifest first if that is all there is.
///
/// Without a usable manifest, returns [`Error::NoAutomaticRestore`] listing the
/// raw artifacts; no destination is ever guessed.
pub fn restore_session(session_dir: &Path) -> Result<RestoreReport> {
    let manifest_path = session_dir.join(MANIFEST_FILE);
    let legacy_path = session_dir.join(LEGACY_MANIFEST_FILE);

    if !manifest_path.exists() && legacy_path.exists() {
        let session_id = Session::at(session_dir)
            .map(|s| s.id().to_string())
            .unwrap_or_default();
        let migrated = manifest::migrate_legacy(&legacy_path, &manifest_path, &session_id)
            .and_then(|_| manifest::confirm_migration(&legacy_path, &manifest_path));
        if let Err(e) = migrated {
            return Err(no_restore(session_dir, &format!("legacy manifest migration failed: {e}")));
        }
    }

    if !manifest_path.exists() {
        return Err(no_restore(session_dir, "no manifest found"));
    }

    match restore(&manifest_path, session_dir) {
        Err(Error::ManifestCorrupt { reason, .. }) => Err(no_restore(session_dir, &reason)),
        other => other,
    }
}

fn no_restore(session_dir: &Path, reason: &str) -> Error {
    Error::NoAutomaticRestore {
        session_dir: session_dir.to_path_buf(),
        reason: reason.to_string(),
        artifacts: raw_artifacts(session_dir).unwrap_or_default(),
    }
}

/// Artifact files in a session directory (manifests, logs and in-progress leftovers excluded)
pub fn raw_artifacts(session_dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(session_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| {
            ![MANIFEST_FILE, LEGACY_MANIFEST_FILE, SESSION_LOG, SESSION_LOG_COMPRESSED]
                .contains(&name.as_str())
                && !is_in_progress(name)
        })
        .collect();
    names.sort();
    Ok(names)
}

fn restore_entry(entry: &ManifestEntry, session_dir: &Path) -> Result<()> {
    let artifact = session_dir.join(&entry.artifact);
    if !artifact.is_file() {
        return Err(Error::PathNotFound(artifact));
    }

    if !entry.checksum.is_empty() {
        let actual = checksum_file(&artifact)?;
        if actual != entry.checksum {
            return Err(Error::VerifyFailed {
                path: artifact,
                reason: "checksum mismatch".to_string(),
            });
        }
    }

    let dest = &entry.original_path;
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    match entry.artifact_type {
        ArtifactType::Directory => {
            fs::create_dir_all(dest)?;
            let file = File::open(&artifact)?;
            if entry.artifact.ends_with(".tar") {
                unpack(tar::Archive::new(file), dest)?;
            } else {
                unpack(tar::Archive::new(GzDecoder::new(file)), dest)?;
            }
        }
        ArtifactType::File => {
            fs::copy(&artifact, dest)?;
        }
    }
    Ok(())
}

fn unpack<R: Read>(mut archive: tar::Archive<R>, dest: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupEngine, BackupOptions};
    use crate::types::RemoveOutcome;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn engine(root: &Path) -> BackupEngine {
        BackupEngine::new(Session::plan(root), BackupOptions { min_backup_size: 0 })
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_round_trip_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("backups"));
        let dir = tmp.path().join("data/cache");
        let file = tmp.path().join("data/notes.txt");
        write(&dir.join("x/y.txt"), "deep");
        write(&file, "notes");

        assert!(matches!(engine.safe_remove(&dir, "cache").unwrap(), RemoveOutcome::Removed { .. }));
        assert!(matches!(engine.safe_remove(&file, "notes").unwrap(), RemoveOutcome::Removed { .. }));
        fs::remove_dir_all(tmp.path().join("data")).unwrap();

        let report = restore_session(engine.session().dir()).unwrap();
        assert_eq!((report.restored, report.failed), (2, 0));
        assert_eq!(fs::read_to_string(dir.join("x/y.txt")).unwrap(), "deep");
        assert_eq!(fs::read_to_string(&file).unwrap(), "notes");
    }

    #[test]
    fn test_partial_failure_continues() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("backups"));
        let paths: Vec<PathBuf> = (1..=3)
            .map(|i| tmp.path().join(format!("data/file{i}.txt")))
            .collect();
        for (i, p) in paths.iter().enumerate() {
            write(p, &format!("content {i}"));
            engine.safe_remove(p, &format!("f{i}")).unwrap();
        }

        let entries = manifest::read(&engine.session().manifest_path()).unwrap();
        fs::remove_file(engine.session().dir().join(&entries[1].artifact)).unwrap();

        let report = restore(&engine.session().manifest_path(), engine.session().dir()).unwrap();
        assert_eq!(report.restored, 2);
        assert_eq!(report.failed, 1);
        assert!(matches!(report.results[1].outcome, EntryOutcome::Failed { .. }));
        assert!(paths[0].exists());
        assert!(!paths[1].exists());
        assert!(paths[2].exists());
    }

    #[test]
    fn test_checksum_mismatch_fails_entry() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("backups"));
        let file = tmp.path().join("data/a.txt");
        write(&file, "original");
        engine.safe_remove(&file, "a").unwrap();

        let entries = manifest::read(&engine.session().manifest_path()).unwrap();
        fs::write(engine.session().dir().join(&entries[0].artifact), "tampered").unwrap();

        let report = restore_session(engine.session().dir()).unwrap();
        assert_eq!(report.failed, 1);
        assert!(!file.exists());
    }

    #[test]
    fn test_missing_manifest_lists_raw_artifacts() {
        let tmp = TempDir::new().unwrap();
        let session = tmp.path().join("2025-01-15-14-23-45");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("npm-cache.tar.gz"), "x").unwrap();
        fs::write(session.join(".half-written.tar.gz.tmp"), "x").unwrap();
        fs::write(session.join("download.tmp"), "x").unwrap();
        fs::write(session.join(SESSION_LOG), "log").unwrap();

        match restore_session(&session) {
            Err(Error::NoAutomaticRestore { artifacts, .. }) => {
                assert_eq!(artifacts, vec!["download.tmp", "npm-cache.tar.gz"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_tmp_suffixed_file_round_trips() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("backups"));
        let file = tmp.path().join("data/download.tmp");
        write(&file, "partial download");

        engine.safe_remove(&file, "pip").unwrap();
        assert!(!file.exists());

        let report = restore_session(engine.session().dir()).unwrap();
        assert_eq!((report.restored, report.failed), (1, 0));
        assert_eq!(fs::read_to_string(&file).unwrap(), "partial download");
    }

    #[test]
    fn test_in_progress_leftover_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp.path().join("backups"));
        let file = tmp.path().join("data/a.txt");
        write(&file, "kept");
        engine.safe_remove(&file, "pip").unwrap();

        let leftover = crate::fsutil::tmp_path(&engine.session().dir().join("pip-b.tar.gz"));
        fs::write(&leftover, "interrupted write").unwrap();

        assert_eq!(raw_artifacts(engine.session().dir()).unwrap(), vec!["pip-a.txt"]);
        let report = restore_session(engine.session().dir()).unwrap();
        assert_eq!((report.restored, report.failed), (1, 0));
        assert_eq!(fs::read_to_string(&file).unwrap(), "kept");
    }

    #[test]
    fn test_corrupt_manifest_never_guesses() {
        let tmp = TempDir::new().unwrap();
        let session = tmp.path().join("2025-01-15-14-23-45");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join(MANIFEST_FILE), "[[[").unwrap();
        fs::write(session.join("pip"), "x").unwrap();

        assert!(matches!(
            restore_session(&session),
            Err(Error::NoAutomaticRestore { .. })
        ));
    }

    #[test]
    fn test_legacy_session_is_migrated_then_restored() {
        let tmp = TempDir::new().unwrap();
        let session = tmp.path().join("2025-01-15-14-23-45");
        let target = tmp.path().join("home/.bashrc");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("bashrc"), "export A=1\n").unwrap();
        fs::write(
            session.join(LEGACY_MANIFEST_FILE),
            format!("{}|bashrc|2025-01-15 14:23:45\n", target.display()),
        )
        .unwrap();

        let report = restore_session(&session).unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "export A=1\n");
        assert!(session.join(LEGACY_MANIFEST_FILE).exists());
        assert!(session.join(MANIFEST_FILE).exists());
    }
}
