use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A sandbox with one config-declared plugin over `<tmp>/cache`
struct Sandbox {
    tmp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        fs::create_dir_all(cache.join("nested")).unwrap();
        fs::write(cache.join("blob.bin"), vec![7u8; 4096]).unwrap();
        fs::write(cache.join("nested/small.txt"), "hello").unwrap();
        fs::create_dir_all(tmp.path().join("backups")).unwrap();

        let config = format!(
            r#"builtin_plugins = false
min_backup_size = "0"

[[plugins]]
name = "test-cache"
category = "development"
paths = ["{}"]
"#,
            cache.display()
        );
        fs::write(tmp.path().join("config.toml"), config).unwrap();
        Self { tmp }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tidyup").unwrap();
        cmd.env("TIDYUP_BACKUP_DIR", self.path("backups"))
            .env("TIDYUP_CONFIG_DIR", self.path("config-dir"))
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(self.path("config.toml"));
        cmd
    }
}

fn sessions(root: &Path) -> Vec<PathBuf> {
    fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[test]
fn help_exits_zero() {
    Command::cargo_bin("tidyup")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--undo"))
        .stdout(predicate::str::contains("worker").not());
}

#[test]
fn unknown_flag_exits_one() {
    Command::cargo_bin("tidyup")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .code(1);
}

#[test]
fn undo_without_backups_exits_zero() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--undo", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));
}

#[test]
fn list_shows_configured_plugins() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("development"))
        .stdout(predicate::str::contains("test-cache"));
}

#[test]
fn dry_run_leaves_backup_root_untouched() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--dry-run", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test-cache"))
        .stdout(predicate::str::contains("Dry run"));

    assert!(sessions(&sandbox.path("backups")).is_empty());
    assert!(sandbox.path("cache/blob.bin").exists());
}

#[test]
fn select_skips_unknown_operation() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--dry-run", "--quiet", "--select", "test-cache,no-such-thing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test-cache"))
        .stderr(predicate::str::contains("no-such-thing"));
}

#[test]
fn select_only_unknown_operations_exits_one() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--dry-run", "--select", "no-such-thing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no-such-thing"));
}

#[test]
fn undo_without_manifest_lists_artifacts() {
    let sandbox = Sandbox::new();
    let session = sandbox.path("backups/2025-01-15-14-23-45");
    fs::create_dir_all(&session).unwrap();
    fs::write(session.join("pip-cache.tar.gz"), "x").unwrap();

    sandbox
        .cmd()
        .args(["--undo", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pip-cache.tar.gz"));
}

#[test]
fn clean_then_undo_round_trip() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["--quiet", "--select", "test-cache"])
        .assert()
        .success();

    assert!(!sandbox.path("cache/blob.bin").exists());
    assert!(sandbox.path("cache").is_dir());

    let created = sessions(&sandbox.path("backups"));
    assert_eq!(created.len(), 1);
    let session = &created[0];
    assert!(session.join("backup_manifest.json").is_file());
    let log = fs::read_to_string(session.join("cleanup.log")).unwrap();
    assert!(log.contains("REMOVE"));

    sandbox.cmd().args(["--undo", "--quiet"]).assert().success();
    assert_eq!(fs::read(sandbox.path("cache/blob.bin")).unwrap(), vec![7u8; 4096]);
    assert_eq!(
        fs::read_to_string(sandbox.path("cache/nested/small.txt")).unwrap(),
        "hello"
    );
}

#[test]
fn schedule_writes_cron_definition() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("--schedule").assert().success();

    let cron = fs::read_to_string(sandbox.path("config-dir/tidyup.cron")).unwrap();
    assert!(cron.contains("--quiet"));
}
