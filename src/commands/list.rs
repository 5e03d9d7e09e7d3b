//! `--list`: the catalog by category

use anyhow::Result;
use catalog::Catalog;
use colored::Colorize;

use crate::Context;
use crate::config::Settings;
use crate::plugins::build_catalog;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let settings = Settings::load(ctx.config.as_deref())?;
    let catalog = build_catalog(&settings);
    if catalog.is_empty() {
        ui::info("No cleanup operations are available.");
        return Ok(());
    }
    print!("{}", render(&catalog));
    Ok(())
}

fn render(catalog: &Catalog) -> String {
    let mut out = String::new();
    for (category, names) in catalog.list_by_category() {
        out.push_str(&format!("{}\n", category.cyan().bold()));
        for name in names {
            let Some(d) = catalog.lookup(&name) else {
                continue;
            };
            let mut line = format!("  {:<28} {}", d.name, format!("v{}", d.version).dimmed());
            if d.requires_admin {
                line.push_str(&format!(" {}", "[admin]".yellow()));
            }
            if !d.dependencies.is_empty() {
                line.push_str(&format!(" after: {}", d.dependencies.join(", ")));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PathPlugin;
    use catalog::PluginDescriptor;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_render() {
        colored::control::set_override(false);
        let mut catalog = Catalog::new();
        let plugin = |n: &str| Arc::new(PathPlugin::new(n, vec![PathBuf::from("/x")]));
        catalog.register(PluginDescriptor::new("yarn-cache", "package-managers", plugin("yarn-cache")).depends_on(["npm-cache"]));
        catalog.register(PluginDescriptor::new("apt-cache", "system", plugin("apt-cache")).requires_admin(true));

        let out = render(&catalog);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "system");
        assert!(lines[1].contains("apt-cache") && lines[1].contains("[admin]"));
        assert_eq!(lines[2], "package-managers");
        assert!(lines[3].contains("after: npm-cache"));
    }
}
