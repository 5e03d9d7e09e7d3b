//! Child-process entry points (`tidyup worker ...`)
//!
//! Workers rebuild the catalog from the same config as the parent and talk
//! back only through files: a sweep result, or the progress file and space
//! ledger in the run directory.

use anyhow::{Context, Result};
use backupkit::{BackupEngine, BackupOptions, RemoveOutcome, Session};
use catalog::{ExecContext, Removal};
use std::path::Path;

use crate::cli::{ExecuteArgs, WorkerCommand};
use crate::config::Settings;
use crate::coordinator::lock::LockOptions;
use crate::coordinator::shared::{LedgerRecord, ProgressFile, ProgressState, SpaceLedger};
use crate::coordinator::sweep::SizeSweepResult;
use crate::plugins::build_catalog;

pub fn run(config: Option<&Path>, command: WorkerCommand) -> Result<()> {
    let settings = Settings::load(config)?;
    match command {
        WorkerCommand::Estimate { plugin, out } => estimate(&settings, &plugin, &out),
        WorkerCommand::Execute(args) => execute(&settings, &args),
    }
}

fn estimate(settings: &Settings, plugin: &str, out: &Path) -> Result<()> {
    init_stderr_logging();
    let catalog = build_catalog(settings);
    let descriptor = catalog.get(plugin)?;
    let bytes = descriptor.plugin.estimate_size().unwrap_or(0);

    let result = SizeSweepResult::new(descriptor.name.clone(), bytes);
    backupkit::fsutil::write_atomic(out, &serde_json::to_vec(&result)?)
        .with_context(|| format!("Could not write {}", out.display()))?;
    Ok(())
}

fn execute(settings: &Settings, args: &ExecuteArgs) -> Result<()> {
    let session = Session::at(&args.session_dir)?;
    init_session_logging(&session);

    let catalog = build_catalog(settings);
    let descriptor = catalog.get(&args.plugin)?;
    log::info!(
        "Starting {} ({}/{}) version {}",
        descriptor.name,
        args.index + 1,
        args.total,
        descriptor.version
    );

    let lock = LockOptions::from(&settings.lock);
    let engine = BackupEngine::new(
        session,
        BackupOptions {
            min_backup_size: settings.min_backup_bytes()?,
        },
    );
    let mut ctx = WorkerContext {
        plugin: descriptor.name.clone(),
        engine: &engine,
        progress: ProgressFile::new(&args.run_dir, lock.clone()),
        ledger: SpaceLedger::new(&args.run_dir, lock),
        index: args.index,
        total: args.total,
    };

    let result = descriptor.plugin.execute(&mut ctx);
    match &result {
        Ok(()) => log::info!("Finished {}", descriptor.name),
        Err(e) => log::error!("{} failed: {e:#}", descriptor.name),
    }
    result
}

/// What a running plugin sees
struct WorkerContext<'a> {
    plugin: String,
    engine: &'a BackupEngine,
    progress: ProgressFile,
    ledger: SpaceLedger,
    index: usize,
    total: usize,
}

impl WorkerContext<'_> {
    fn append(&self, record: &LedgerRecord) {
        if let Err(e) = self.ledger.append(record) {
            log::warn!("Could not append to space ledger: {e}");
        }
    }
}

impl ExecContext for WorkerContext<'_> {
    fn remove(&mut self, path: &Path, logical_name: &str) -> Removal {
        match self.engine.safe_remove(path, logical_name) {
            Ok(RemoveOutcome::Missing) => Removal::Missing,
            Ok(RemoveOutcome::Removed { freed, .. }) => Removal::Removed { freed },
            Err(e) => {
                log::error!("Backup failed for {}, not deleting: {e}", path.display());
                let reason = e.to_string();
                self.append(&LedgerRecord::Protected {
                    plugin: self.plugin.clone(),
                    path: path.to_path_buf(),
                    reason: reason.clone(),
                });
                Removal::Protected { reason }
            }
        }
    }

    fn report_items(&mut self, current: u64, total: u64, label: &str) {
        let state = ProgressState {
            operation_index: self.index,
            total_operations: self.total,
            operation_name: self.plugin.clone(),
            current_item: current,
            total_items: total,
            item_label: label.to_string(),
        };
        match self.progress.write(&state) {
            Ok(false) => {}
            Ok(true) => self.append(&LedgerRecord::LockTimeout {
                file: crate::coordinator::shared::PROGRESS_FILE.to_string(),
            }),
            Err(e) => log::debug!("Could not update progress: {e}"),
        }
    }

    fn record_freed(&mut self, bytes: u64) {
        self.append(&LedgerRecord::Freed {
            plugin: self.plugin.clone(),
            bytes,
        });
    }
}

fn init_stderr_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .format_timestamp(None)
        .try_init();
}

/// Info and above into the session's `cleanup.log`, created on first line
fn init_session_logging(session: &Session) {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(session.log_writer())))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::shared::aggregate;
    use catalog::Plugin;
    use crate::plugins::PathPlugin;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        engine: BackupEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("run")).unwrap();
            let engine = BackupEngine::new(
                Session::plan(&tmp.path().join("backups")),
                BackupOptions { min_backup_size: 0 },
            );
            Self { tmp, engine }
        }

        fn ctx(&self) -> WorkerContext<'_> {
            let run = self.tmp.path().join("run");
            WorkerContext {
                plugin: "cache".to_string(),
                engine: &self.engine,
                progress: ProgressFile::new(&run, LockOptions::default()),
                ledger: SpaceLedger::new(&run, LockOptions::default()),
                index: 0,
                total: 1,
            }
        }
    }

    #[test]
    fn test_plugin_run_backs_up_and_records_freed() {
        let fx = Fixture::new();
        let cache = fx.tmp.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("blob"), vec![1u8; 256]).unwrap();

        let plugin = PathPlugin::new("cache", vec![cache.clone()]);
        let mut ctx = fx.ctx();
        plugin.execute(&mut ctx).unwrap();

        assert!(cache.exists());
        assert!(!cache.join("blob").exists());
        let summary = aggregate(&ctx.ledger.records().unwrap());
        assert_eq!(summary.freed_by("cache"), 256);

        let entries = backupkit::manifest::read(&fx.engine.session().manifest_path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_path, cache);

        let state = ctx.progress.read().unwrap();
        assert_eq!((state.current_item, state.total_items), (1, 1));
    }

    #[cfg(unix)]
    #[test]
    fn test_backup_failure_protects_path() {
        let fx = Fixture::new();
        let fifo = fx.tmp.path().join("pipe");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        let mut ctx = fx.ctx();
        let removal = ctx.remove(&fifo, "cache");
        assert!(matches!(removal, Removal::Protected { .. }));
        assert!(fifo.exists());

        let summary = aggregate(&ctx.ledger.records().unwrap());
        assert_eq!(summary.protected.len(), 1);
        assert_eq!(summary.total, 0);
    }
}
