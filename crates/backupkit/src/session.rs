//! Backup sessions: one timestamped directory per run
//!
//! A session is planned up front but only created on disk when something is
//! first written to it, so a run that never backs anything up leaves the
//! backup root untouched.

use chrono::{Local, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::manifest::{LEGACY_MANIFEST_FILE, MANIFEST_FILE, ManifestStore};

/// Operation log file name inside a session directory
pub const SESSION_LOG: &str = "cleanup.log";

/// Compressed operation log of a finished session
pub const SESSION_LOG_COMPRESSED: &str = "cleanup.log.gz";

/// chrono format of a session id
pub const SESSION_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

static SESSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}(-\d+)?$").expect("valid session id regex")
});

/// Whether a directory name looks like a session id
pub fn is_session_id(name: &str) -> bool {
    SESSION_ID_RE.is_match(name)
}

/// One run's backup directory
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

impl Session {
    /// Pick a fresh session id under `backup_root` without creating anything
    pub fn plan(backup_root: &Path) -> Self {
        let base = Local::now().format(SESSION_ID_FORMAT).to_string();
        let mut id = base.clone();
        let mut n = 1;
        while backup_root.join(&id).exists() {
            id = format!("{base}-{n}");
            n += 1;
        }
        Self {
            dir: backup_root.join(&id),
            id,
        }
    }

    /// Open an existing (or planned) session by directory
    pub fn at(dir: &Path) -> Result<Self> {
        let id = dir
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_session_id(n))
            .ok_or_else(|| Error::InvalidSession(dir.to_path_buf()))?;
        Ok(Self {
            id: id.to_string(),
            dir: dir.to_path_buf(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn legacy_manifest_path(&self) -> PathBuf {
        self.dir.join(LEGACY_MANIFEST_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(SESSION_LOG)
    }

    pub fn manifest(&self) -> ManifestStore {
        ManifestStore::new(self.manifest_path())
    }

    /// Whether the session directory has been created
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Create the directory and an empty manifest if needed
    pub fn ensure(&self) -> Result<()> {
        if self.create()? {
            log::info!("Created backup session {}", self.dir.display());
        }
        Ok(())
    }

    /// Returns whether the directory was new. Never logs.
    fn create(&self) -> Result<bool> {
        let created = !self.dir.is_dir();
        if created {
            fs::create_dir_all(&self.dir)?;
        }
        let created_at = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.manifest().init(&self.id, &created_at)?;
        Ok(created)
    }

    /// Append a durable line to the session log
    pub fn audit(&self, line: &str) -> Result<()> {
        self.ensure()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(
            file,
            "{} {line}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        file.sync_data()?;
        Ok(())
    }

    /// Writer appending to this session's log.
    ///
    /// Lines are held in memory until something else creates the session;
    /// the writer itself never does.
    pub fn log_writer(&self) -> SessionLogWriter {
        SessionLogWriter {
            session: self.clone(),
            pending: Vec::new(),
            file: None,
        }
    }
}

/// Append handle on `cleanup.log`, opened once the session exists
#[derive(Debug)]
pub struct SessionLogWriter {
    session: Session,
    pending: Vec<u8>,
    file: Option<File>,
}

impl SessionLogWriter {
    fn open(&mut self) -> io::Result<Option<&mut File>> {
        if self.file.is_none() {
            if !self.session.exists() {
                return Ok(None);
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.session.log_path())?;
            file.write_all(&self.pending)?;
            self.pending.clear();
            self.file = Some(file);
        }
        Ok(self.file.as_mut())
    }
}

impl Write for SessionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.open()? {
            Some(file) => file.write(buf),
            None => {
                self.pending.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.open()? {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Session ids under `backup_root`, most recent first
pub fn list_sessions(backup_root: &Path) -> Result<Vec<String>> {
    if !backup_root.exists() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = fs::read_dir(backup_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| is_session_id(name))
        .collect();

    ids.sort_by(|a, b| session_sort_key(b).cmp(&session_sort_key(a)));
    Ok(ids)
}

/// (timestamp part, numeric suffix) so that `-10` sorts after `-9`
fn session_sort_key(id: &str) -> (&str, u32) {
    let stamp = &id[..id.len().min(19)];
    let suffix = id
        .get(20..)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (stamp, suffix)
}

/// Delete all but the newest `keep` sessions. `current` is never deleted.
pub fn prune_sessions(backup_root: &Path, keep: usize, current: Option<&str>) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for id in list_sessions(backup_root)?.into_iter().skip(keep) {
        if Some(id.as_str()) == current {
            continue;
        }
        let dir = backup_root.join(&id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::info!("Pruned old backup session {}", dir.display());
                removed.push(id);
            }
            Err(e) => log::warn!("Failed to prune {}: {e}", dir.display()),
        }
    }
    Ok(removed)
}

/// gzip `cleanup.log` of every session except `current`.
///
/// This is the only change ever made to a finished session.
pub fn compress_logs(backup_root: &Path, current: &str) -> Result<usize> {
    let mut compressed = 0;
    for id in list_sessions(backup_root)? {
        if id == current {
            continue;
        }
        let dir = backup_root.join(&id);
        let log = dir.join(SESSION_LOG);
        if !log.is_file() {
            continue;
        }
        match compress_file(&log, &dir.join(SESSION_LOG_COMPRESSED)) {
            Ok(()) => compressed += 1,
            Err(e) => log::warn!("Failed to compress {}: {e}", log.display()),
        }
    }
    Ok(compressed)
}

fn compress_file(src: &Path, dest: &Path) -> io::Result<()> {
    let tmp = crate::fsutil::tmp_path(dest);
    {
        let mut input = File::open(src)?;
        let mut encoder = GzEncoder::new(File::create(&tmp)?, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.sync_all()?;
    }
    fs::rename(&tmp, dest)?;
    fs::remove_file(src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_is_session_id() {
        assert!(is_session_id("2025-01-15-14-23-45"));
        assert!(is_session_id("2025-01-15-14-23-45-2"));
        assert!(!is_session_id("2025-01-15"));
        assert!(!is_session_id("notes"));
    }

    #[test]
    fn test_plan_does_not_create() {
        let tmp = TempDir::new().unwrap();
        let session = Session::plan(tmp.path());
        assert!(is_session_id(session.id()));
        assert!(!session.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_plan_avoids_existing_ids() {
        let tmp = TempDir::new().unwrap();
        let first = Session::plan(tmp.path());
        first.ensure().unwrap();
        let second = Session::plan(tmp.path());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_audit_creates_session_lazily() {
        let tmp = TempDir::new().unwrap();
        let session = Session::plan(tmp.path());
        session.audit("SKIP /x too small").unwrap();

        assert!(session.manifest_path().exists());
        let log = fs::read_to_string(session.log_path()).unwrap();
        assert!(log.contains("SKIP /x too small"));
    }

    #[test]
    fn test_log_writer_waits_for_session() {
        let tmp = TempDir::new().unwrap();
        let session = Session::plan(tmp.path());
        let mut writer = session.log_writer();
        writeln!(writer, "starting").unwrap();
        writer.flush().unwrap();
        assert!(!session.exists());

        session.ensure().unwrap();
        writeln!(writer, "backed up").unwrap();
        assert_eq!(
            fs::read_to_string(session.log_path()).unwrap(),
            "starting\nbacked up\n"
        );
    }

    #[test]
    fn test_log_writer_alone_leaves_no_session() {
        let tmp = TempDir::new().unwrap();
        let session = Session::plan(tmp.path());
        let mut writer = session.log_writer();
        for _ in 0..3 {
            writeln!(writer, "nothing to back up").unwrap();
        }
        drop(writer);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_at_rejects_non_session_dirs() {
        assert!(Session::at(Path::new("/tmp/whatever")).is_err());
        let s = Session::at(Path::new("/b/2025-01-15-14-23-45")).unwrap();
        assert_eq!(s.id(), "2025-01-15-14-23-45");
    }

    #[test]
    fn test_list_sessions_most_recent_first() {
        let tmp = TempDir::new().unwrap();
        for id in [
            "2025-01-15-14-23-45",
            "2025-03-01-09-00-00",
            "2025-01-15-14-23-45-2",
            "2025-01-15-14-23-45-10",
            "not-a-session",
        ] {
            fs::create_dir(tmp.path().join(id)).unwrap();
        }
        fs::write(tmp.path().join("2025-04-01-00-00-00"), "file, not dir").unwrap();

        assert_eq!(
            list_sessions(tmp.path()).unwrap(),
            vec![
                "2025-03-01-09-00-00",
                "2025-01-15-14-23-45-10",
                "2025-01-15-14-23-45-2",
                "2025-01-15-14-23-45",
            ]
        );
        assert!(list_sessions(&tmp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_prune_sessions_keeps_newest_and_current() {
        let tmp = TempDir::new().unwrap();
        for id in [
            "2025-01-01-00-00-00",
            "2025-01-02-00-00-00",
            "2025-01-03-00-00-00",
            "2025-01-04-00-00-00",
        ] {
            fs::create_dir(tmp.path().join(id)).unwrap();
        }

        let removed = prune_sessions(tmp.path(), 2, Some("2025-01-01-00-00-00")).unwrap();
        assert_eq!(removed, vec!["2025-01-02-00-00-00"]);
        assert_eq!(list_sessions(tmp.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_compress_logs_skips_current() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("2025-01-01-00-00-00");
        let current = tmp.path().join("2025-01-02-00-00-00");
        fs::create_dir(&old).unwrap();
        fs::create_dir(&current).unwrap();
        fs::write(old.join(SESSION_LOG), "old run\n").unwrap();
        fs::write(current.join(SESSION_LOG), "this run\n").unwrap();

        assert_eq!(compress_logs(tmp.path(), "2025-01-02-00-00-00").unwrap(), 1);
        assert!(!old.join(SESSION_LOG).exists());
        assert!(current.join(SESSION_LOG).exists());

        let mut text = String::new();
        GzDecoder::new(File::open(old.join(SESSION_LOG_COMPRESSED)).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "old run\n");
    }
}
