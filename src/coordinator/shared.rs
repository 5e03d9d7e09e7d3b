//! Files shared between the coordinator, the display and worker children
//!
//! - [`ProgressFile`]: a single [`ProgressState`] record, overwritten in place
//! - [`SpaceLedger`]: append-only JSON lines of bytes freed and protected paths
//!
//! Both are accessed under [`FileLock`](super::lock::FileLock).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::lock::{LockOptions, with_lock};

pub const PROGRESS_FILE: &str = "progress.json";
pub const LEDGER_FILE: &str = "space.ledger";

/// Where the run is, as seen by the display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub operation_index: usize,
    pub total_operations: usize,
    pub operation_name: String,
    pub current_item: u64,
    pub total_items: u64,
    pub item_label: String,
}

impl ProgressState {
    /// Overall completion in `0.0..=1.0`: finished operations plus the
    /// fraction of items done in the current one
    pub fn fraction(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        let within = if self.total_items == 0 {
            0.0
        } else {
            (self.current_item.min(self.total_items)) as f64 / self.total_items as f64
        };
        ((self.operation_index as f64 + within) / self.total_operations as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressFile {
    path: PathBuf,
    lock: LockOptions,
}

impl ProgressFile {
    pub fn new(run_dir: &Path, lock: LockOptions) -> Self {
        Self {
            path: run_dir.join(PROGRESS_FILE),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the record. Returns `true` if the write happened unlocked.
    pub fn write(&self, state: &ProgressState) -> io::Result<bool> {
        let json = serde_json::to_vec(state)?;
        let ((), degraded) = with_lock(&self.path, &self.lock, || fs::write(&self.path, &json))?;
        Ok(degraded)
    }

    /// Current record, or `None` if absent or mid-write garbage
    pub fn read(&self) -> Option<ProgressState> {
        let (content, _) = with_lock(&self.path, &self.lock, || fs::read(&self.path)).ok()?;
        serde_json::from_slice(&content).ok()
    }
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    Freed { plugin: String, bytes: u64 },
    /// Backup failed so the path was kept
    Protected {
        plugin: String,
        path: PathBuf,
        reason: String,
    },
    /// A shared-file write went ahead without the lock
    LockTimeout { file: String },
}

#[derive(Debug, Clone)]
pub struct SpaceLedger {
    path: PathBuf,
    lock: LockOptions,
}

impl SpaceLedger {
    pub fn new(run_dir: &Path, lock: LockOptions) -> Self {
        Self {
            path: run_dir.join(LEDGER_FILE),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LedgerRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let ((), degraded) = with_lock(&self.path, &self.lock, || self.append_line(&line))?;
        if degraded {
            let note = LedgerRecord::LockTimeout {
                file: LEDGER_FILE.to_string(),
            };
            let mut line = serde_json::to_string(&note)?;
            line.push('\n');
            self.append_line(&line)?;
        }
        Ok(())
    }

    fn append_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// All parseable records; torn or unknown lines are skipped
    pub fn records(&self) -> io::Result<Vec<LedgerRecord>> {
        let content = match with_lock(&self.path, &self.lock, || fs::read_to_string(&self.path)) {
            Ok((content, _)) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Skipping unreadable ledger line: {e}");
                    None
                }
            })
            .collect())
    }
}

/// Ledger totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceSummary {
    /// Bytes freed per plugin, in order of first appearance
    pub per_plugin: Vec<(String, u64)>,
    pub total: u64,
    /// (plugin, path, reason)
    pub protected: Vec<(String, PathBuf, String)>,
    pub lock_timeouts: usize,
}

impl SpaceSummary {
    pub fn freed_by(&self, plugin: &str) -> u64 {
        self.per_plugin
            .iter()
            .find(|(name, _)| name == plugin)
            .map_or(0, |(_, bytes)| *bytes)
    }
}

/// Sum bytes per plugin
pub fn aggregate(records: &[LedgerRecord]) -> SpaceSummary {
    let mut summary = SpaceSummary::default();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match record {
            LedgerRecord::Freed { plugin, bytes } => {
                let idx = *slots.entry(plugin.as_str()).or_insert_with(|| {
                    summary.per_plugin.push((plugin.clone(), 0));
                    summary.per_plugin.len() - 1
                });
                summary.per_plugin[idx].1 = summary.per_plugin[idx].1.saturating_add(*bytes);
                summary.total = summary.total.saturating_add(*bytes);
            }
            LedgerRecord::Protected {
                plugin,
                path,
                reason,
            } => summary
                .protected
                .push((plugin.clone(), path.clone(), reason.clone())),
            LedgerRecord::LockTimeout { .. } => summary.lock_timeouts += 1,
        }
    }
    summary
}
