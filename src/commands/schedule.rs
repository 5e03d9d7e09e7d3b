//! `--schedule`: write a crontab definition for a weekly quiet run
//!
//! Installing it is left to the user (`crontab`, a systemd timer, launchd).

use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::paths;
use crate::ui;

pub const CRON_FILE: &str = "tidyup.cron";

/// Sundays at 03:00
const CRON_SCHEDULE: &str = "0 3 * * 0";

pub fn run(ctx: &Context) -> Result<()> {
    let exe = std::env::current_exe().context("Could not determine the tidyup executable")?;
    let dir = paths::config_dir()?;
    let path = write_definition(&dir, &exe, ctx.config.as_deref())?;

    ui::success(&format!("Wrote {}", path.display()));
    ui::dim(&format!("Install with: (crontab -l 2>/dev/null; cat {}) | crontab -", path.display()));
    Ok(())
}

pub fn cron_line(exe: &Path, config: Option<&Path>) -> String {
    let mut line = format!("{CRON_SCHEDULE} {}", exe.display());
    if let Some(config) = config {
        line.push_str(&format!(" --config {}", config.display()));
    }
    line.push_str(" --quiet");
    line
}

fn write_definition(dir: &Path, exe: &Path, config: Option<&Path>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;
    let path = dir.join(CRON_FILE);
    let content = format!("# tidyup weekly cleanup\n{}\n", cron_line(exe, config));
    fs::write(&path, content).with_context(|| format!("Could not write {}", path.display()))?;
    log::info!("Wrote schedule to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cron_line() {
        assert_eq!(
            cron_line(Path::new("/usr/local/bin/tidyup"), None),
            "0 3 * * 0 /usr/local/bin/tidyup --quiet"
        );
        assert_eq!(
            cron_line(Path::new("/bin/tidyup"), Some(Path::new("/etc/t.toml"))),
            "0 3 * * 0 /bin/tidyup --config /etc/t.toml --quiet"
        );
    }

    #[test]
    fn test_write_definition_overwrites() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("config");
        write_definition(&dir, Path::new("/old"), None).unwrap();
        let path = write_definition(&dir, Path::new("/new"), None).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("/new --quiet"));
        assert!(!content.contains("/old"));
    }
}
