//! Filesystem primitives: sizes, free space, checksums, atomic writes

use blake3::Hasher;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Size in bytes of a file, or the sum of all files under a directory.
///
/// Missing paths and unreadable entries count as zero. Symlinks are not followed.
pub fn path_size(path: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }

    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Bytes freed between two size samples.
///
/// A sample that grew is an anomaly (something wrote while we deleted);
/// it is logged and counted as zero.
pub fn freed_between(path: &Path, before: u64, after: u64) -> u64 {
    if after > before {
        log::warn!(
            "Size anomaly for {}: grew from {} to {} bytes during removal, counting 0 freed",
            path.display(),
            before,
            after
        );
        0
    } else {
        before - after
    }
}

/// Free bytes on the volume holding `path` (or its nearest existing ancestor)
#[cfg(unix)]
pub fn available_space(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let check_path = path
        .ancestors()
        .find(|p| p.exists())
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);

    let c_path = CString::new(check_path.as_os_str().as_bytes())
        .map_err(|_| Error::PathNotFound(check_path.clone()))?;

    // SAFETY: statvfs is a standard POSIX call; the struct is only read on success
    #[allow(unsafe_code)]
    let available = unsafe {
        let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
        if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        let stat = stat.assume_init();

        // Cast needed on macOS, not on Linux
        #[allow(clippy::unnecessary_cast)]
        let avail = stat.f_bavail as u64 * stat.f_frsize as u64;
        avail
    };

    Ok(available)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Result<u64> {
    log::warn!("Cannot check free space on this platform");
    Ok(u64::MAX)
}

/// Fail unless the volume holding `dir` has at least `required` free bytes
pub fn ensure_space(dir: &Path, source: &Path, required: u64) -> Result<()> {
    let available = available_space(dir)?;
    if available < required {
        return Err(Error::InsufficientSpace {
            path: source.to_path_buf(),
            required,
            available,
        });
    }
    Ok(())
}

/// BLAKE3 hex digest of a file
pub fn checksum_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Hasher::new();

    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// In-progress sibling of `path`: `.<name>.tmp`.
///
/// The leading dot keeps it out of the artifact namespace, since
/// [`sanitize_name`] never yields a name starting with `.`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Whether a session directory entry is an in-progress write
pub fn is_in_progress(name: &str) -> bool {
    name.starts_with('.')
}

/// Remove everything inside `dir`, keeping `dir` itself.
///
/// Best effort: failures are logged and counted, never fatal.
pub fn remove_contents(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot list {}: {e}", dir.display());
            return 1;
        }
    };

    let mut failures = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let result = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            log::warn!("Failed to remove {}: {e}", path.display());
            failures += 1;
        }
    }
    failures
}

/// Make a string safe to use as a file name component
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "backup".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_size_file_and_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a"), vec![0u8; 100]).unwrap();
        fs::write(dir.join("nested/b"), vec![0u8; 50]).unwrap();

        assert_eq!(path_size(&dir.join("a")), 100);
        assert_eq!(path_size(&dir), 150);
        assert_eq!(path_size(&tmp.path().join("missing")), 0);
    }

    #[test]
    fn test_freed_between_clamps_growth() {
        let p = Path::new("/x");
        assert_eq!(freed_between(p, 100, 40), 60);
        assert_eq!(freed_between(p, 100, 100), 0);
        assert_eq!(freed_between(p, 10, 40), 0);
    }

    #[test]
    fn test_checksum_is_stable() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, "hello").unwrap();
        fs::write(&b, "hello").unwrap();

        let sum = checksum_file(&a).unwrap();
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, checksum_file(&b).unwrap());
    }

    #[test]
    fn test_write_atomic_leaves_no_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file.json");
        write_atomic(&path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_tmp_path_is_hidden_sibling() {
        let tmp = tmp_path(Path::new("/s/pip-a.tmp"));
        assert_eq!(tmp, Path::new("/s/.pip-a.tmp.tmp"));
        assert!(is_in_progress(&tmp.file_name().unwrap().to_string_lossy()));
        assert!(!is_in_progress(&sanitize_name(".hidden")));
    }

    #[test]
    fn test_remove_contents_keeps_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("sub/x"), "x").unwrap();
        fs::write(dir.join("y"), "y").unwrap();

        assert_eq!(remove_contents(&dir), 0);
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("npm cache/v2"), "npm_cache_v2");
        assert_eq!(sanitize_name("..."), "backup");
        assert_eq!(sanitize_name("chrome-cache"), "chrome-cache");
    }

    #[test]
    fn test_available_space_uses_existing_ancestor() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("not/yet/created");
        assert!(available_space(&missing).unwrap() > 0);
    }
}
