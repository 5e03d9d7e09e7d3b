mod cli;
mod commands;
mod config;
mod coordinator;
mod paths;
mod plugins;
mod select;
mod ui;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, Internal};
use commands::clean::CleanArgs;
use coordinator::RunError;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status for a user interrupt (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // Workers set up their own logging
    if let Some(Internal::Worker(command)) = cli.command.take() {
        return match commands::worker::run(cli.config.as_deref(), command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config.clone(),
    };

    match dispatch(&ctx, cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(run_error @ RunError::Interrupted { .. }) = e.downcast_ref::<RunError>() {
                commands::clean::report_interrupt(run_error);
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            ui::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(ctx: &Context, cli: Cli) -> Result<()> {
    log::debug!("verbosity {}", ctx.verbose);
    if cli.list {
        commands::list::run(ctx)
    } else if cli.schedule {
        commands::schedule::run(ctx)
    } else if cli.undo {
        commands::undo::run(ctx)
    } else {
        commands::clean::run(
            ctx,
            CleanArgs {
                dry_run: cli.dry_run,
                select: cli.select,
            },
        )
    }
}
