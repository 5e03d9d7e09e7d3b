//! Cross-process lock for the shared progress and ledger files
//!
//! Each guarded file has a sidecar `<file>.lock`. Acquisition is a
//! non-blocking `flock` retried a bounded number of times; when retries run
//! out the caller proceeds without the lock and the event is logged as a
//! lock timeout. Progress and space telemetry tolerate that; the backup
//! manifest is never guarded by this lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::config::LockSettings;

#[derive(Debug, Clone)]
pub struct LockOptions {
    pub retries: u32,
    pub retry_delay: Duration,
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockSettings::default())
    }
}

impl From<&LockSettings> for LockOptions {
    fn from(settings: &LockSettings) -> Self {
        Self {
            retries: settings.retries,
            retry_delay: settings.retry_delay(),
            stale_after: settings.stale_after(),
        }
    }
}

/// Sidecar lock path for `target`
pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(unix)]
type Held = nix::fcntl::Flock<File>;
#[cfg(not(unix))]
type Held = File;

/// Held lock; released on drop.
///
/// A degraded guard holds nothing: retries ran out and the caller is
/// proceeding unlocked.
pub struct FileLock {
    path: PathBuf,
    held: Option<Held>,
}

impl FileLock {
    /// Acquire the lock guarding `target`.
    ///
    /// The sidecar file is never unlinked, so every process locks the same
    /// inode. A stale owner marker is only replaced while the lock is held.
    pub fn acquire(target: &Path, options: &LockOptions) -> io::Result<Self> {
        let path = lock_path(target);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        for attempt in 0..=options.retries {
            match try_lock(file)? {
                Ok(mut held) => {
                    report_stale(&held, &path, options.stale_after);
                    write_owner(&mut held);
                    return Ok(Self {
                        path,
                        held: Some(held),
                    });
                }
                Err(returned) => file = returned,
            }
            if attempt < options.retries {
                thread::sleep(options.retry_delay);
            }
        }

        log::warn!(
            "Lock timeout on {} after {} attempts, proceeding unlocked",
            path.display(),
            options.retries + 1
        );
        Ok(Self { path, held: None })
    }

    pub fn is_degraded(&self) -> bool {
        self.held.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Run `f` while holding the lock for `target`.
///
/// Returns the closure's result and whether the lock was degraded.
pub fn with_lock<T>(
    target: &Path,
    options: &LockOptions,
    f: impl FnOnce() -> io::Result<T>,
) -> io::Result<(T, bool)> {
    let guard = FileLock::acquire(target, options)?;
    let value = f()?;
    Ok((value, guard.is_degraded()))
}

/// Log a marker left by a holder that is gone (flock died with it)
fn report_stale(file: &File, path: &Path, stale_after: Duration) {
    let Ok(meta) = file.metadata() else {
        return;
    };
    let age = meta
        .modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or_default();
    if meta.len() > 0 && age > stale_after {
        log::warn!(
            "Reclaiming stale lock {} ({}s old)",
            path.display(),
            age.as_secs()
        );
    }
}

/// Record the owner; also refreshes the mtime used for staleness
fn write_owner(file: &mut File) {
    let line = format!(
        "{} {}\n",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    );
    if let Err(e) = file.set_len(0).and_then(|()| file.write_all(line.as_bytes())) {
        log::debug!("Could not write lock owner: {e}");
    }
}

/// Non-blocking exclusive lock. `Ok(Err(file))` means someone else holds it.
#[cfg(unix)]
fn try_lock(file: File) -> io::Result<Result<Held, File>> {
    use nix::errno::Errno;
    use nix::fcntl::{Flock, FlockArg};

    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(held) => Ok(Ok(held)),
        Err((file, Errno::EWOULDBLOCK)) => Ok(Err(file)),
        Err((_, errno)) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
fn try_lock(file: File) -> io::Result<Result<Held, File>> {
    Ok(Ok(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn fast() -> LockOptions {
        LockOptions {
            retries: 3,
            retry_delay: Duration::from_millis(5),
            stale_after: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/run/progress.json")),
            PathBuf::from("/run/progress.json.lock")
        );
    }

    #[test]
    fn test_acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("progress.json");

        let guard = FileLock::acquire(&target, &fast()).unwrap();
        assert!(!guard.is_degraded());
        assert!(guard.path().exists());
        drop(guard);

        let again = FileLock::acquire(&target, &fast()).unwrap();
        assert!(!again.is_degraded());
    }

    #[test]
    fn test_contention_falls_back_unlocked() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("space.ledger");
        let held = FileLock::acquire(&target, &fast()).unwrap();

        // flock is per open file description, so a second open in another
        // thread contends like another process would
        let (tx, rx) = mpsc::channel();
        let t = target.clone();
        thread::spawn(move || {
            let guard = FileLock::acquire(&t, &fast()).unwrap();
            tx.send(guard.is_degraded()).unwrap();
        });
        assert!(rx.recv().unwrap());
        drop(held);
    }

    #[test]
    fn test_with_lock_reports_degraded_flag() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("f");
        let (value, degraded) = with_lock(&target, &fast(), || Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert!(!degraded);
    }

    #[test]
    fn test_stale_marker_reclaimed_in_place() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("progress.json");
        fs::write(lock_path(&target), "99999 old\n").unwrap();

        let options = LockOptions {
            stale_after: Duration::ZERO,
            ..fast()
        };
        thread::sleep(Duration::from_millis(10));
        let guard = FileLock::acquire(&target, &options).unwrap();
        assert!(!guard.is_degraded());
        let owner = fs::read_to_string(guard.path()).unwrap();
        assert!(owner.starts_with(&std::process::id().to_string()));
        assert!(!owner.contains("old"));
    }

    #[cfg(unix)]
    #[test]
    fn test_held_lock_survives_staleness() {
        use std::os::unix::fs::MetadataExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("space.ledger");
        let options = LockOptions {
            stale_after: Duration::ZERO,
            ..fast()
        };
        let held = FileLock::acquire(&target, &options).unwrap();
        let inode = fs::metadata(held.path()).unwrap().ino();
        thread::sleep(Duration::from_millis(10));

        let (tx, rx) = mpsc::channel();
        let t = target.clone();
        let opts = options.clone();
        thread::spawn(move || {
            let guard = FileLock::acquire(&t, &opts).unwrap();
            tx.send(guard.is_degraded()).unwrap();
        });
        assert!(rx.recv().unwrap());
        assert_eq!(fs::metadata(held.path()).unwrap().ino(), inode);
    }
}
