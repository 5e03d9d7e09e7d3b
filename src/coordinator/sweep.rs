//! Size sweep: estimate every plugin in parallel child processes
//!
//! Each child writes one [`SizeSweepResult`] to `sweep/<n>.json` in the run
//! directory. Results that are missing or unreadable once every child has
//! exited are recomputed in-process.

use catalog::Catalog;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::Duration;

use super::execute::terminate;
use super::RunError;
use super::interrupt::InterruptFlag;
use super::launcher::{WorkerLauncher, spawn};
use crate::ui;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Estimated reclaimable bytes per plugin
pub type SizeMap = BTreeMap<String, u64>;

/// What an estimate worker writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSweepResult {
    pub plugin_name: String,
    pub size_bytes: u64,
    pub formatted_size: String,
}

impl SizeSweepResult {
    pub fn new(plugin_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            size_bytes,
            formatted_size: ui::format_size(size_bytes),
        }
    }
}

pub struct Sweep<'a, L: WorkerLauncher> {
    pub launcher: &'a L,
    pub dir: PathBuf,
    pub jobs: usize,
    pub grace: Duration,
    pub interrupt: &'a InterruptFlag,
}

impl<L: WorkerLauncher> Sweep<'_, L> {
    /// Estimate every plugin in `catalog`. Every name is present in the result.
    pub fn run(&self, catalog: &Catalog) -> Result<SizeMap, RunError> {
        fs::create_dir_all(&self.dir)?;

        let mut sizes = SizeMap::new();
        let mut queue: VecDeque<(String, PathBuf)> = VecDeque::new();
        for (i, descriptor) in catalog.iter().enumerate() {
            if descriptor.has_estimator() {
                queue.push_back((descriptor.name.clone(), self.dir.join(format!("{i}.json"))));
            } else {
                sizes.insert(descriptor.name.clone(), 0);
            }
        }

        let outputs: Vec<(String, PathBuf)> = queue.iter().cloned().collect();
        let mut running: Vec<(String, Child)> = Vec::new();

        while !queue.is_empty() || !running.is_empty() {
            if self.interrupt.is_set() {
                for (_, child) in &mut running {
                    terminate(child, self.grace)?;
                }
                return Err(RunError::Interrupted { session_dir: None });
            }

            while running.len() < self.jobs.max(1) {
                let Some((name, out)) = queue.pop_front() else {
                    break;
                };
                match spawn(self.launcher.estimate_command(&name, &out)) {
                    Ok(child) => running.push((name, child)),
                    Err(e) => log::warn!("Could not start size worker for {name}: {e}"),
                }
            }

            let mut still_running = Vec::with_capacity(running.len());
            for (name, mut child) in running {
                match child.try_wait()? {
                    Some(status) if !status.success() => {
                        log::warn!("Size worker for {name} exited with {status}");
                    }
                    Some(_) => {}
                    None => still_running.push((name, child)),
                }
            }
            running = still_running;

            if !running.is_empty() {
                thread::sleep(POLL_INTERVAL);
            }
        }

        let mut missing = Vec::new();
        for (name, out) in &outputs {
            match read_result(out, name) {
                Some(bytes) => {
                    sizes.insert(name.clone(), bytes);
                }
                None => missing.push(name.clone()),
            }
            let _ = fs::remove_file(out);
        }

        if !missing.is_empty() {
            log::warn!(
                "Recomputing sizes in-process for: {}",
                missing.join(", ")
            );
            let recomputed: Vec<(String, u64)> = missing
                .par_iter()
                .map(|name| {
                    let bytes = catalog
                        .lookup(name)
                        .and_then(|d| d.plugin.estimate_size())
                        .unwrap_or(0);
                    (name.clone(), bytes)
                })
                .collect();
            sizes.extend(recomputed);
        }

        Ok(sizes)
    }
}

fn read_result(path: &Path, expected: &str) -> Option<u64> {
    let content = fs::read(path).ok()?;
    let result: SizeSweepResult = match serde_json::from_slice(&content) {
        Ok(result) => result,
        Err(e) => {
            log::warn!("Unreadable sweep result {}: {e}", path.display());
            return None;
        }
    };
    if result.plugin_name != expected {
        log::warn!(
            "Sweep result {} names '{}', expected '{expected}'",
            path.display(),
            result.plugin_name
        );
        return None;
    }
    Some(result.size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::launcher::testing::ScriptLauncher;
    use crate::plugins::PathPlugin;
    use catalog::PluginDescriptor;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn catalog_with(tmp: &Path, names: &[&str]) -> Catalog {
        let mut catalog = Catalog::new();
        for name in names {
            let dir = tmp.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("data"), vec![0u8; 64]).unwrap();
            catalog.register(PluginDescriptor::new(
                *name,
                "development",
                Arc::new(PathPlugin::new(*name, vec![dir])),
            ));
        }
        catalog
    }

    fn sweep<'a>(
        launcher: &'a ScriptLauncher,
        dir: PathBuf,
        flag: &'a InterruptFlag,
    ) -> Sweep<'a, ScriptLauncher> {
        Sweep {
            launcher,
            dir,
            jobs: 2,
            grace: Duration::from_millis(200),
            interrupt: flag,
        }
    }

    #[test]
    fn test_results_merged_and_files_removed() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog_with(tmp.path(), &["a", "b", "c"]);
        let launcher = ScriptLauncher::default()
            .estimate("a", r#"echo '{"plugin_name":"a","size_bytes":100,"formatted_size":"100 B"}' > "$OUT""#)
            .estimate("b", r#"echo '{"plugin_name":"b","size_bytes":200,"formatted_size":"200 B"}' > "$OUT""#)
            .estimate("c", r#"echo '{"plugin_name":"c","size_bytes":300,"formatted_size":"300 B"}' > "$OUT""#);
        let flag = InterruptFlag::detached();
        let dir = tmp.path().join("sweep");

        let sizes = sweep(&launcher, dir.clone(), &flag).run(&catalog).unwrap();
        assert_eq!(sizes["a"], 100);
        assert_eq!(sizes["b"], 200);
        assert_eq!(sizes["c"], 300);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_or_garbage_result_recomputed() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog_with(tmp.path(), &["silent", "garbage", "crash"]);
        let launcher = ScriptLauncher::default()
            .estimate("silent", "exit 0")
            .estimate("garbage", r#"echo 'lots of bytes' > "$OUT""#)
            .estimate("crash", "exit 9");
        let flag = InterruptFlag::detached();

        let sizes = sweep(&launcher, tmp.path().join("sweep"), &flag)
            .run(&catalog)
            .unwrap();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.values().all(|&bytes| bytes == 64));
    }

    #[test]
    fn test_interrupt_stops_sweep() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog_with(tmp.path(), &["slow"]);
        let launcher = ScriptLauncher::default().estimate("slow", "sleep 30");
        let flag = InterruptFlag::detached();
        flag.trigger();

        let result = sweep(&launcher, tmp.path().join("sweep"), &flag).run(&catalog);
        assert!(matches!(result, Err(RunError::Interrupted { .. })));
    }

    #[test]
    fn test_result_file_format() {
        let result = SizeSweepResult::new("pip-cache", 2048);
        assert_eq!(result.formatted_size, "2.0 KB");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""plugin_name":"pip-cache""#));
    }
}
