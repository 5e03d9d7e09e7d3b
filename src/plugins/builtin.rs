//! Built-in cache plugins
//!
//! Each entry is a plain path list; paths that do not exist on this machine
//! are filtered out, and a plugin left with no paths is not offered.

use catalog::PluginDescriptor;
use std::path::PathBuf;
use std::sync::Arc;

use super::PathPlugin;

struct Builtin {
    name: &'static str,
    category: &'static str,
    requires_admin: bool,
    paths: Vec<PathBuf>,
}

fn candidates() -> Vec<Builtin> {
    let home = dirs::home_dir().unwrap_or_default();
    let cache = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
    let data = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));

    vec![
        Builtin {
            name: "thumbnails",
            category: "system",
            requires_admin: false,
            paths: vec![cache.join("thumbnails")],
        },
        Builtin {
            name: "trash",
            category: "system",
            requires_admin: false,
            paths: vec![data.join("Trash/files"), data.join("Trash/info"), home.join(".Trash")],
        },
        Builtin {
            name: "apt-cache",
            category: "system",
            requires_admin: true,
            paths: vec![PathBuf::from("/var/cache/apt/archives")],
        },
        Builtin {
            name: "chrome-cache",
            category: "browsers",
            requires_admin: false,
            paths: vec![cache.join("google-chrome"), cache.join("Google/Chrome")],
        },
        Builtin {
            name: "firefox-cache",
            category: "browsers",
            requires_admin: false,
            paths: vec![cache.join("mozilla/firefox"), cache.join("Firefox")],
        },
        Builtin {
            name: "cargo-registry-cache",
            category: "development",
            requires_admin: false,
            paths: vec![home.join(".cargo/registry/cache")],
        },
        Builtin {
            name: "npm-cache",
            category: "package-managers",
            requires_admin: false,
            paths: vec![home.join(".npm/_cacache")],
        },
        Builtin {
            name: "pip-cache",
            category: "package-managers",
            requires_admin: false,
            paths: vec![cache.join("pip")],
        },
        Builtin {
            name: "yarn-cache",
            category: "package-managers",
            requires_admin: false,
            paths: vec![cache.join("yarn")],
        },
        Builtin {
            name: "homebrew-cache",
            category: "package-managers",
            requires_admin: false,
            paths: vec![cache.join("Homebrew")],
        },
        Builtin {
            name: "xsession-errors",
            category: "logs",
            requires_admin: false,
            paths: vec![home.join(".xsession-errors"), home.join(".xsession-errors.old")],
        },
        Builtin {
            name: "user-logs",
            category: "logs",
            requires_admin: false,
            paths: vec![home.join("Library/Logs")],
        },
    ]
}

/// Descriptors for the built-ins present on this machine
pub fn builtin_plugins() -> Vec<PluginDescriptor> {
    candidates()
        .into_iter()
        .filter_map(|b| {
            let paths: Vec<PathBuf> = b.paths.into_iter().filter(|p| p.exists()).collect();
            if paths.is_empty() {
                log::trace!("Built-in '{}' has nothing on this machine", b.name);
                return None;
            }
            Some(
                PluginDescriptor::new(b.name, b.category, Arc::new(PathPlugin::new(b.name, paths)))
                    .requires_admin(b.requires_admin),
            )
        })
        .collect()
}
