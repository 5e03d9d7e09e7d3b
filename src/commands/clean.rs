//! The cleanup run: sweep, select, confirm, execute, summarize

use anyhow::{Context as _, Result, bail};
use backupkit::Session;
use catalog::Catalog;
use colored::Colorize;
use std::path::Path;

use crate::Context;
use crate::config::Settings;
use crate::coordinator::interrupt::InterruptFlag;
use crate::coordinator::launcher::{SelfLauncher, WorkerLauncher};
use crate::coordinator::sweep::SizeMap;
use crate::coordinator::{
    Coordinator, CoordinatorOptions, ExecutionReport, OperationOutcome, RunError,
};
use crate::plugins::build_catalog;
use crate::select::{AutoSelector, ExplicitSelector, InteractiveSelector, Selector};
use crate::ui;

#[derive(Debug, Default)]
pub struct CleanArgs {
    pub dry_run: bool,
    pub select: Vec<String>,
}

pub fn run(ctx: &Context, args: CleanArgs) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let catalog = build_catalog(&settings);
    if catalog.is_empty() {
        bail!("No cleanup operations are available (check builtin_plugins and [[plugins]] in the config)");
    }
    let backup_root = settings.backup_root()?;

    let interrupt = InterruptFlag::install().context("Could not install interrupt handler")?;
    let launcher = SelfLauncher::current(ctx.config.as_deref())?;
    let options = CoordinatorOptions::from_settings(&settings, !ctx.quiet && console::user_attended_stderr());
    let is_admin = options.is_admin;
    let coordinator = Coordinator::new(launcher, options, interrupt)?;

    let mut selector: Box<dyn Selector> = match (args.select.is_empty(), ctx.quiet) {
        (true, true) => Box::new(AutoSelector { is_admin }),
        (true, false) => Box::new(InteractiveSelector),
        (false, true) => Box::new(ExplicitSelector {
            names: args.select.clone(),
            confirm: AutoSelector { is_admin },
        }),
        (false, false) => Box::new(ExplicitSelector {
            names: args.select.clone(),
            confirm: InteractiveSelector,
        }),
    };

    Orchestrator {
        ctx,
        settings: &settings,
        catalog: &catalog,
        backup_root: &backup_root,
        coordinator,
    }
    .run(selector.as_mut(), args.dry_run)
}

/// One run, parameterized over how workers are launched
pub struct Orchestrator<'a, L: WorkerLauncher> {
    pub ctx: &'a Context,
    pub settings: &'a Settings,
    pub catalog: &'a Catalog,
    pub backup_root: &'a Path,
    pub coordinator: Coordinator<L>,
}

impl<L: WorkerLauncher> Orchestrator<'_, L> {
    pub fn run(mut self, selector: &mut dyn Selector, dry_run: bool) -> Result<()> {
        if !self.ctx.quiet {
            ui::header("Estimating reclaimable space");
        }
        let sizes = self.coordinator.sweep(self.catalog)?;
        if !self.ctx.quiet {
            print_sizes(self.catalog, &sizes);
        }

        let selected = match selector.select(self.catalog, &sizes) {
            Ok(selected) => selected,
            Err(e) if was_interrupted(&e, self.coordinator.interrupt()) => {
                return Err(self.coordinator.interrupted(None).into());
            }
            Err(e) => return Err(e),
        };
        if selected.is_empty() {
            ui::info("Nothing selected.");
            self.coordinator.finish_without_executing()?;
            return Ok(());
        }

        let ordered = self.catalog.order_selection(&selected)?;
        for (plugin, dep) in &ordered.unselected_dependencies {
            ui::warn(&format!("{plugin} depends on {dep}, which is not selected"));
        }

        let planned: u64 = ordered.order.iter().filter_map(|n| sizes.get(n)).sum();
        if !self.ctx.quiet || dry_run {
            ui::section("Plan");
            for (i, name) in ordered.order.iter().enumerate() {
                ui::plan_row(
                    i + 1,
                    ordered.order.len(),
                    name,
                    sizes.get(name).copied().unwrap_or(0),
                );
            }
        }

        if dry_run {
            ui::info(&format!(
                "Dry run: about {} reclaimable. Nothing was backed up or deleted.",
                ui::format_size(planned)
            ));
            self.coordinator.finish_without_executing()?;
            return Ok(());
        }

        let prompt = format!(
            "Back up and remove about {} across {} operation(s)?",
            ui::format_size(planned),
            ordered.order.len()
        );
        match selector.confirm(&prompt) {
            Ok(true) => {}
            Ok(false) => {
                ui::info("Aborted. No changes made.");
                self.coordinator.finish_without_executing()?;
                return Ok(());
            }
            Err(e) if was_interrupted(&e, self.coordinator.interrupt()) => {
                return Err(self.coordinator.interrupted(None).into());
            }
            Err(e) => return Err(e),
        }

        let session = Session::plan(self.backup_root);
        match backupkit::compress_logs(self.backup_root, session.id()) {
            Ok(0) => {}
            Ok(n) => log::info!("Compressed {n} older session log(s)"),
            Err(e) => log::warn!("Could not compress older session logs: {e}"),
        }

        let report = self
            .coordinator
            .execute(self.catalog, &ordered.order, session.dir())
            .with_context(|| format!("Log: {}", session.log_path().display()))?;

        print_summary(&report);
        self.finish_session(&session);
        Ok(())
    }

    fn finish_session(&self, session: &Session) {
        if !session.exists() {
            ui::dim("No backup session was needed.");
            return;
        }

        match backupkit::prune_sessions(self.backup_root, self.settings.retention, Some(session.id())) {
            Ok(pruned) if !pruned.is_empty() => {
                log::info!("Pruned {} old session(s)", pruned.len());
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not prune old sessions: {e}"),
        }

        println!();
        ui::kv("Backup session", &session.dir().display().to_string());
        ui::kv("Log", &session.log_path().display().to_string());
        ui::dim("Run `tidyup --undo` to restore.");
    }
}

/// Ctrl-C at a prompt arrives as an `Interrupted` read error rather than SIGINT
fn was_interrupted(err: &anyhow::Error, flag: &InterruptFlag) -> bool {
    flag.is_set()
        || err.chain().any(|e| {
            e.downcast_ref::<std::io::Error>()
                .is_some_and(|io| io.kind() == std::io::ErrorKind::Interrupted)
        })
}

/// Interrupted runs print where the partial backups are
pub fn report_interrupt(err: &RunError) {
    if let RunError::Interrupted { session_dir } = err {
        ui::warn("Interrupted.");
        if let Some(dir) = session_dir.as_deref().filter(|d| d.exists()) {
            ui::kv("Backups so far", &dir.display().to_string());
            ui::dim("Run `tidyup --undo` to restore them.");
        }
    }
}

fn print_sizes(catalog: &Catalog, sizes: &SizeMap) {
    for (category, names) in catalog.list_by_category() {
        ui::section(&category);
        for name in names {
            ui::size_row(&name, sizes.get(&name).copied().unwrap_or(0));
        }
    }
    println!();
}

fn print_summary(report: &ExecutionReport) {
    ui::header("Summary");
    for op in &report.operations {
        let freed = ui::format_size(op.freed);
        match &op.outcome {
            OperationOutcome::Completed => ui::success(&format!("{}: freed {freed}", op.name)),
            OperationOutcome::Failed { reason } => {
                ui::error(&format!("{}: failed ({reason}), freed {freed}", op.name));
            }
            OperationOutcome::TimedOut { after } => ui::warn(&format!(
                "{}: timed out after {}s, freed {freed} before stopping",
                op.name,
                after.as_secs()
            )),
            OperationOutcome::Skipped { reason } => {
                ui::warn(&format!("{}: skipped ({reason})", op.name));
            }
        }
    }

    if !report.space.protected.is_empty() {
        ui::section("Kept because backup failed");
        for (plugin, path, reason) in &report.space.protected {
            ui::dim(&format!("{plugin}: {} ({reason})", path.display()));
        }
    }
    if report.space.lock_timeouts > 0 {
        ui::dim(&format!(
            "{} progress/ledger update(s) ran without the lock",
            report.space.lock_timeouts
        ));
    }

    println!();
    ui::kv("Total freed", &ui::format_size(report.space.total).green().bold().to_string());
    let problems = report.failed().count();
    if problems > 0 {
        ui::kv("Operations with problems", &problems.to_string());
    }
}
