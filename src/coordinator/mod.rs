//! Concurrency coordinator
//!
//! Drives one run through `Idle -> Sweeping -> AwaitingSelection ->
//! Executing -> {Complete, Interrupted}`. Work happens in child processes:
//! a bounded pool of size estimators, then one child per selected operation,
//! strictly in order. Children share nothing with the coordinator except the
//! lock-guarded files in the run directory, which is removed on drop.

pub mod display;
pub mod execute;
pub mod interrupt;
pub mod launcher;
pub mod lock;
pub mod shared;
pub mod sweep;

use catalog::{Catalog, Error as CatalogError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::Settings;
use display::Display;
use execute::{ChildExit, supervise};
use interrupt::InterruptFlag;
use launcher::{ExecuteJob, WorkerLauncher, spawn};
use lock::LockOptions;
use shared::{ProgressFile, ProgressState, SpaceLedger, SpaceSummary, aggregate};
use sweep::{SizeMap, Sweep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sweeping,
    AwaitingSelection,
    Executing,
    Complete,
    Interrupted,
}

impl Phase {
    fn can_move_to(self, next: Self) -> bool {
        use Phase::{AwaitingSelection, Complete, Executing, Idle, Interrupted, Sweeping};
        matches!(
            (self, next),
            (Idle, Sweeping)
                | (Sweeping, AwaitingSelection)
                | (AwaitingSelection, Executing | Complete)
                | (Executing, Complete)
                | (Sweeping | AwaitingSelection | Executing, Interrupted)
        )
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid phase transition {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    /// User interrupt; `session_dir` is set once backups may exist
    #[error("interrupted")]
    Interrupted { session_dir: Option<PathBuf> },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// How one selected operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    Failed { reason: String },
    TimedOut { after: Duration },
    /// Not started: unknown plugin, or admin rights missing
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct OperationReport {
    pub name: String,
    pub outcome: OperationOutcome,
    /// Bytes recorded in the ledger, including partial progress before a timeout
    pub freed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub operations: Vec<OperationReport>,
    pub space: SpaceSummary,
}

impl ExecutionReport {
    pub fn failed(&self) -> impl Iterator<Item = &OperationReport> {
        self.operations
            .iter()
            .filter(|op| !matches!(op.outcome, OperationOutcome::Completed))
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub sweep_jobs: usize,
    pub operation_timeout: Duration,
    pub kill_grace: Duration,
    pub progress_interval: Duration,
    pub lock: LockOptions,
    pub show_progress: bool,
    /// Effective uid is 0
    pub is_admin: bool,
}

impl CoordinatorOptions {
    pub fn from_settings(settings: &Settings, show_progress: bool) -> Self {
        Self {
            sweep_jobs: settings.sweep_jobs,
            operation_timeout: settings.operation_timeout(),
            kill_grace: settings.kill_grace(),
            progress_interval: settings.progress_interval(),
            lock: LockOptions::from(&settings.lock),
            show_progress,
            is_admin: is_admin(),
        }
    }
}

#[cfg(unix)]
pub fn is_admin() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_admin() -> bool {
    false
}

/// Scratch directory for one run; removed with everything in it on drop
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    pub fn create(parent: &Path) -> io::Result<Self> {
        let path = parent.join(format!(
            "tidyup-run-{}-{}",
            std::process::id(),
            chrono::Local::now().format("%H%M%S%f")
        ));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::debug!("Could not remove run dir {}: {e}", self.path.display());
        }
    }
}

pub struct Coordinator<L: WorkerLauncher> {
    phase: Phase,
    launcher: L,
    options: CoordinatorOptions,
    interrupt: InterruptFlag,
    run_dir: RunDir,
}

impl<L: WorkerLauncher> Coordinator<L> {
    pub fn new(launcher: L, options: CoordinatorOptions, interrupt: InterruptFlag) -> io::Result<Self> {
        Self::in_dir(launcher, options, interrupt, &std::env::temp_dir())
    }

    /// Like [`new`](Self::new) with the run directory created under `parent`
    pub fn in_dir(
        launcher: L,
        options: CoordinatorOptions,
        interrupt: InterruptFlag,
        parent: &Path,
    ) -> io::Result<Self> {
        Ok(Self {
            phase: Phase::Idle,
            launcher,
            options,
            interrupt,
            run_dir: RunDir::create(parent)?,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run_dir(&self) -> &Path {
        self.run_dir.path()
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn transition(&mut self, to: Phase) -> Result<(), RunError> {
        if !self.phase.can_move_to(to) {
            return Err(RunError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        log::debug!("Coordinator {:?} -> {to:?}", self.phase);
        self.phase = to;
        Ok(())
    }

    /// Record the interrupt and build the error to return
    pub fn interrupted(&mut self, session_dir: Option<&Path>) -> RunError {
        let _ = self.transition(Phase::Interrupted);
        RunError::Interrupted {
            session_dir: session_dir.map(Path::to_path_buf),
        }
    }

    /// Estimate every plugin. Ends in `AwaitingSelection`.
    pub fn sweep(&mut self, catalog: &Catalog) -> Result<SizeMap, RunError> {
        self.transition(Phase::Sweeping)?;
        let result = Sweep {
            launcher: &self.launcher,
            dir: self.run_dir.path().join("sweep"),
            jobs: self.options.sweep_jobs,
            grace: self.options.kill_grace,
            interrupt: &self.interrupt,
        }
        .run(catalog);

        match result {
            Ok(sizes) => {
                self.transition(Phase::AwaitingSelection)?;
                Ok(sizes)
            }
            Err(RunError::Interrupted { .. }) => Err(self.interrupted(None)),
            Err(e) => Err(e),
        }
    }

    /// Close a run that executes nothing (empty selection, dry run)
    pub fn finish_without_executing(&mut self) -> Result<(), RunError> {
        self.transition(Phase::Complete)
    }

    /// Run `order` sequentially, one child each. Ends in `Complete`.
    pub fn execute(
        &mut self,
        catalog: &Catalog,
        order: &[String],
        session_dir: &Path,
    ) -> Result<ExecutionReport, RunError> {
        self.transition(Phase::Executing)?;

        let progress = ProgressFile::new(self.run_dir.path(), self.options.lock.clone());
        let ledger = SpaceLedger::new(self.run_dir.path(), self.options.lock.clone());
        let display = Display::start(
            progress.clone(),
            self.options.progress_interval,
            self.options.show_progress,
        );

        let total = order.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, name) in order.iter().enumerate() {
            if self.interrupt.is_set() {
                display.stop();
                return Err(self.interrupted(Some(session_dir)));
            }

            if let Err(reason) = self.check_runnable(catalog, name) {
                log::error!("Skipping {name}: {reason}");
                outcomes.push((name.clone(), OperationOutcome::Skipped { reason }));
                continue;
            }

            write_progress(&progress, &ledger, &ProgressState {
                operation_index: index,
                total_operations: total,
                operation_name: name.clone(),
                ..Default::default()
            });

            let job = ExecuteJob {
                plugin: name,
                index,
                total,
                session_dir,
                run_dir: self.run_dir.path(),
            };
            let outcome = match spawn(self.launcher.execute_command(&job)) {
                Ok(mut child) => match supervise(
                    &mut child,
                    self.options.operation_timeout,
                    self.options.kill_grace,
                    &self.interrupt,
                )? {
                    ChildExit::Exited(status) if status.success() => OperationOutcome::Completed,
                    ChildExit::Exited(status) => OperationOutcome::Failed {
                        reason: format!("worker exited with {status}"),
                    },
                    ChildExit::TimedOut => OperationOutcome::TimedOut {
                        after: self.options.operation_timeout,
                    },
                    ChildExit::Interrupted => {
                        display.stop();
                        return Err(self.interrupted(Some(session_dir)));
                    }
                },
                Err(e) => OperationOutcome::Failed {
                    reason: format!("could not start worker: {e}"),
                },
            };
            if let OperationOutcome::TimedOut { after } = &outcome {
                log::error!("{name} timed out after {}s", after.as_secs());
            }
            outcomes.push((name.clone(), outcome));

            write_progress(&progress, &ledger, &ProgressState {
                operation_index: index + 1,
                total_operations: total,
                operation_name: name.clone(),
                ..Default::default()
            });
        }

        display.stop();

        let space = aggregate(&ledger.records()?);
        let operations = outcomes
            .into_iter()
            .map(|(name, outcome)| OperationReport {
                freed: space.freed_by(&name),
                name,
                outcome,
            })
            .collect();

        self.transition(Phase::Complete)?;
        Ok(ExecutionReport { operations, space })
    }

    fn check_runnable(&self, catalog: &Catalog, name: &str) -> Result<(), String> {
        let descriptor = catalog.get(name).map_err(|e| e.to_string())?;
        if descriptor.requires_admin && !self.options.is_admin {
            return Err(CatalogError::PluginInvalid {
                name: descriptor.name.clone(),
                reason: "requires administrator privileges".to_string(),
            }
            .to_string());
        }
        Ok(())
    }
}

fn write_progress(progress: &ProgressFile, ledger: &SpaceLedger, state: &ProgressState) {
    match progress.write(state) {
        Ok(false) => {}
        Ok(true) => {
            let record = shared::LedgerRecord::LockTimeout {
                file: shared::PROGRESS_FILE.to_string(),
            };
            if let Err(e) = ledger.append(&record) {
                log::warn!("Could not record lock timeout in the space ledger: {e}");
            }
        }
        Err(e) => log::warn!("Could not update progress: {e}"),
    }
}
