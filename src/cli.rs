use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tidyup")]
#[command(author = "tidyup contributors")]
#[command(version)]
#[command(about = "Reclaim disk space from caches and logs, with a backup of everything removed", long_about = None)]
pub struct Cli {
    /// Estimate and select, but do not back up or delete anything
    #[arg(long, conflicts_with_all = ["undo", "schedule", "list"])]
    pub dry_run: bool,

    /// Restore a previous backup session
    #[arg(long, conflicts_with_all = ["schedule", "list", "select"])]
    pub undo: bool,

    /// Write a weekly cron definition for `tidyup --quiet`
    #[arg(long, conflicts_with_all = ["list", "select"])]
    pub schedule: bool,

    /// List available operations by category
    #[arg(long, conflicts_with = "select")]
    pub list: bool,

    /// No prompts: select every non-empty operation and confirm automatically
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operations to run, comma-separated (skips interactive selection)
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub select: Vec<String>,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long, env = "TIDYUP_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Internal>,
}

/// Commands used between tidyup processes
#[derive(Subcommand, Debug)]
pub enum Internal {
    #[command(hide = true, subcommand)]
    Worker(WorkerCommand),
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Estimate one plugin and write the result as JSON
    Estimate {
        #[arg(long)]
        plugin: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Run one plugin
    Execute(ExecuteArgs),
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    #[arg(long)]
    pub plugin: String,
    #[arg(long)]
    pub index: usize,
    #[arg(long)]
    pub total: usize,
    #[arg(long)]
    pub session_dir: PathBuf,
    #[arg(long)]
    pub run_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_select_splits_on_commas() {
        let cli = Cli::try_parse_from(["tidyup", "--dry-run", "--select", "npm-cache,pip-cache"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.select, vec!["npm-cache", "pip-cache"]);
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        assert!(Cli::try_parse_from(["tidyup", "--undo", "--dry-run"]).is_err());
        assert!(Cli::try_parse_from(["tidyup", "--list", "--schedule"]).is_err());
    }

    #[test]
    fn test_worker_subcommand_with_global_config() {
        let cli = Cli::try_parse_from([
            "tidyup", "--config", "/c.toml", "worker", "estimate", "--plugin", "trash", "--out", "/o.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/c.toml")));
        assert!(matches!(
            cli.command,
            Some(Internal::Worker(WorkerCommand::Estimate { .. }))
        ));
    }
}
