//! # Backupkit
//!
//! Backups taken before destructive cleanup, and their restoration.
//!
//! This crate provides:
//! - [`Session`]: one timestamped directory per run, created lazily
//! - [`BackupEngine`]: atomic, verified artifacts (tar.gz for directories,
//!   byte copies for files) recorded in the session manifest
//! - [`ManifestStore`]: the append-only structured manifest, plus migration
//!   of the legacy `original|backup|timestamp` format
//! - [`restore_session`]: put a session back, entry by entry
//!
//! ## Example
//!
//! ```no_run
//! use backupkit::{BackupEngine, BackupOptions, RemoveOutcome, Session};
//! use std::path::Path;
//!
//! let session = Session::plan(Path::new("/var/backups/tidyup"));
//! let engine = BackupEngine::new(session, BackupOptions::default());
//!
//! if let RemoveOutcome::Removed { freed, .. } =
//!     engine.safe_remove(Path::new("/home/me/.cache/pip"), "pip-cache")?
//! {
//!     println!("freed {freed} bytes");
//! }
//!
//! let report = backupkit::restore_session(engine.session().dir())?;
//! println!("{} restored, {} failed", report.restored, report.failed);
//! # Ok::<(), backupkit::Error>(())
//! ```

pub mod backup;
mod error;
pub mod fsutil;
pub mod manifest;
pub mod restore;
pub mod session;
mod types;

pub use backup::{BackupEngine, BackupOptions, DEFAULT_MIN_BACKUP_SIZE};
pub use error::{Error, Result};
pub use manifest::{
    LEGACY_MANIFEST_FILE, MANIFEST_FILE, ManifestStore, confirm_migration, migrate_legacy,
};
pub use restore::{raw_artifacts, restore, restore_session};
pub use session::{Session, compress_logs, list_sessions, prune_sessions};
pub use types::{
    ArtifactType, BackupOutcome, EntryOutcome, EntryResult, Manifest, ManifestEntry,
    RemoveOutcome, RestoreReport,
};
