//! `--undo`: restore a backup session

use anyhow::{Context as _, Result};
use backupkit::{EntryOutcome, Error as BackupError, ManifestStore, RestoreReport, Session};
use colored::Colorize;
use dialoguer::{Confirm, Select};
use std::path::{Path, PathBuf};

use crate::Context;
use crate::config::Settings;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let backup_root = settings.backup_root()?;

    let sessions = backupkit::list_sessions(&backup_root)
        .with_context(|| format!("Could not list sessions in {}", backup_root.display()))?;
    if sessions.is_empty() {
        ui::info(&format!("No backups found in {}", backup_root.display()));
        return Ok(());
    }

    let id = if ctx.quiet {
        sessions[0].clone()
    } else {
        let labels: Vec<String> = sessions
            .iter()
            .map(|id| session_label(&backup_root, id))
            .collect();
        let idx = Select::new()
            .with_prompt("Session to restore")
            .items(&labels)
            .default(0)
            .interact()
            .context("Failed to read session selection")?;
        sessions[idx].clone()
    };

    let session = Session::at(&backup_root.join(&id))?;
    if !ctx.quiet
        && !Confirm::new()
            .with_prompt(format!("Restore session {id} to the original locations?"))
            .default(false)
            .interact()
            .context("Failed to read user input")?
    {
        ui::info("Aborted. No changes made.");
        return Ok(());
    }

    match restore(&session)? {
        Restored::Automatic(report) => log::info!(
            "Restored {} of {} entries from {id}",
            report.restored,
            report.results.len()
        ),
        Restored::Manual(artifacts) => {
            log::info!("{} artifact(s) in {id} left for manual restore", artifacts.len());
        }
    }
    Ok(())
}

/// How an undo ended. Both variants are reported, neither is an error.
#[derive(Debug)]
enum Restored {
    Automatic(RestoreReport),
    /// No usable manifest; these files are left for the user
    Manual(Vec<PathBuf>),
}

fn restore(session: &Session) -> Result<Restored> {
    ui::header(&format!("Restoring {}", session.id()));

    let report = match backupkit::restore_session(session.dir()) {
        Ok(report) => report,
        Err(BackupError::NoAutomaticRestore {
            session_dir,
            reason,
            artifacts,
        }) => {
            ui::error(&format!("Automatic restore is not possible: {reason}"));
            if artifacts.is_empty() {
                ui::dim("The session directory holds no artifacts.");
            } else {
                ui::section("Artifacts (restore by hand)");
                for artifact in &artifacts {
                    ui::dim(&session_dir.join(artifact).display().to_string());
                }
            }
            return Ok(Restored::Manual(
                artifacts.iter().map(|a| session_dir.join(a)).collect(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    for result in &report.results {
        match &result.outcome {
            EntryOutcome::Restored => {
                ui::success(&result.original_path.display().to_string());
            }
            EntryOutcome::Failed { reason } => ui::error(&format!(
                "{} ({}): {reason}",
                result.original_path.display(),
                result.artifact
            )),
        }
    }

    println!();
    ui::kv("Restored", &report.restored.to_string().green().to_string());
    if report.failed > 0 {
        ui::kv("Failed", &report.failed.to_string().red().to_string());
        ui::dim(&format!("Details: {}", session.log_path().display()));
    }
    Ok(Restored::Automatic(report))
}

fn session_label(backup_root: &Path, id: &str) -> String {
    let store = ManifestStore::new(backup_root.join(id).join(backupkit::MANIFEST_FILE));
    match store.entries() {
        Ok(entries) => {
            let bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
            format!("{id}  {} entries, {}", entries.len(), ui::format_size(bytes))
        }
        Err(_) => format!("{id}  (no readable manifest)"),
    }
}
