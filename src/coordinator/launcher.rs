//! How worker children are started
//!
//! In production the binary re-invokes itself through the hidden `worker`
//! subcommand; tests substitute shell commands.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// One operation handed to an execute worker
#[derive(Debug, Clone)]
pub struct ExecuteJob<'a> {
    pub plugin: &'a str,
    pub index: usize,
    pub total: usize,
    pub session_dir: &'a Path,
    pub run_dir: &'a Path,
}

pub trait WorkerLauncher {
    /// Command that writes a `SizeSweepResult` for `plugin` to `out`
    fn estimate_command(&self, plugin: &str, out: &Path) -> Command;

    /// Command that runs one operation
    fn execute_command(&self, job: &ExecuteJob<'_>) -> Command;
}

/// Launches `tidyup worker ...` using the running executable
#[derive(Debug, Clone)]
pub struct SelfLauncher {
    exe: PathBuf,
    config: Option<PathBuf>,
}

impl SelfLauncher {
    pub fn current(config: Option<&Path>) -> io::Result<Self> {
        Ok(Self {
            exe: std::env::current_exe()?,
            config: config.map(Path::to_path_buf),
        })
    }

    fn base(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        if let Some(config) = &self.config {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("worker");
        cmd
    }
}

impl WorkerLauncher for SelfLauncher {
    fn estimate_command(&self, plugin: &str, out: &Path) -> Command {
        let mut cmd = self.base();
        cmd.arg("estimate")
            .arg("--plugin")
            .arg(plugin)
            .arg("--out")
            .arg(out);
        cmd
    }

    fn execute_command(&self, job: &ExecuteJob<'_>) -> Command {
        let mut cmd = self.base();
        cmd.arg("execute")
            .arg("--plugin")
            .arg(job.plugin)
            .arg("--index")
            .arg(job.index.to_string())
            .arg("--total")
            .arg(job.total.to_string())
            .arg("--session-dir")
            .arg(job.session_dir)
            .arg("--run-dir")
            .arg(job.run_dir);
        cmd
    }
}

/// Spawn a worker in its own process group with no terminal I/O.
///
/// The group id equals the child's pid, so signalling `-pid` reaches any
/// process the worker starts too. Terminal SIGINT goes to the foreground
/// group only, which leaves termination order to the coordinator.
pub fn spawn(mut cmd: Command) -> io::Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
}
