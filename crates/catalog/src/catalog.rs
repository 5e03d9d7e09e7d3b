//! The plugin registry

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::plugin::PluginDescriptor;

/// Categories shown first in selection menus, in this order.
/// Unknown categories follow alphabetically.
pub const PREFERRED_CATEGORIES: &[&str] = &[
    "system",
    "browsers",
    "development",
    "package-managers",
    "applications",
    "logs",
];

/// Normalize a plugin name: trim, strip surrounding quotes/brackets, lowercase
pub fn normalize_name(name: &str) -> String {
    let mut s = name.trim();
    loop {
        let stripped = [('"', '"'), ('\'', '\''), ('[', ']'), ('(', ')'), ('{', '}'), ('<', '>')]
            .iter()
            .find_map(|(open, close)| {
                s.strip_prefix(*open)
                    .and_then(|rest| rest.strip_suffix(*close))
            });
        match stripped {
            Some(inner) => s = inner.trim(),
            None => break,
        }
    }
    s.to_lowercase()
}

/// Execution order for a selection, plus dependency warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSelection {
    pub order: Vec<String>,
    /// (plugin, dependency) pairs where the dependency was not selected
    pub unselected_dependencies: Vec<(String, String)>,
}

/// Registry of cleanup operations, built once at startup
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<PluginDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, overwriting any entry with the same normalized name.
    ///
    /// Returns `false` (and logs) when the plugin has nothing to execute.
    pub fn register(&mut self, mut descriptor: PluginDescriptor) -> bool {
        let name = normalize_name(&descriptor.name);
        if name.is_empty() || !descriptor.plugin.is_runnable() {
            log::error!(
                "Refusing to register plugin '{}': no executor",
                descriptor.name
            );
            return false;
        }

        descriptor.name = name.clone();
        descriptor.dependencies = descriptor
            .dependencies
            .iter()
            .map(|d| normalize_name(d))
            .filter(|d| !d.is_empty())
            .collect();

        if let Some(&idx) = self.index.get(&name) {
            log::debug!("Plugin '{name}' re-registered, replacing previous entry");
            self.entries[idx] = descriptor;
        } else {
            self.index.insert(name, self.entries.len());
            self.entries.push(descriptor);
        }
        true
    }

    /// Find a plugin by name (normalized before lookup)
    pub fn lookup(&self, name: &str) -> Option<&PluginDescriptor> {
        let key = normalize_name(name);
        if let Some(&idx) = self.index.get(&key) {
            return self.entries.get(idx);
        }
        self.entries.iter().find(|d| normalize_name(&d.name) == key)
    }

    /// Like [`lookup`](Self::lookup) but returns a typed error
    pub fn get(&self, name: &str) -> Result<&PluginDescriptor> {
        self.lookup(name)
            .ok_or_else(|| Error::PluginNotFound(normalize_name(name)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All plugins in registration order
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.iter()
    }

    /// Plugin names grouped by category for selection menus.
    ///
    /// Known categories come first in [`PREFERRED_CATEGORIES`] order, then
    /// unknown ones alphabetically. Names keep registration order.
    pub fn list_by_category(&self) -> Vec<(String, Vec<String>)> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            groups
                .entry(entry.category.clone())
                .or_default()
                .push(entry.name.clone());
        }

        let mut ordered = Vec::with_capacity(groups.len());
        for known in PREFERRED_CATEGORIES {
            if let Some(names) = groups.remove(*known) {
                ordered.push(((*known).to_string(), names));
            }
        }
        ordered.extend(groups);
        ordered
    }

    /// Transitive dependencies of `name` (depth-first), ending with `name` itself
    pub fn resolve_dependencies(&self, name: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = Vec::new();
        self.visit_all(&normalize_name(name), &mut order, &mut done, &mut visiting)?;
        Ok(order)
    }

    fn visit_all(
        &self,
        name: &str,
        order: &mut Vec<String>,
        done: &mut HashSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(cycle_error(name, visiting));
        }
        let descriptor = self.get(name)?;

        visiting.push(name.to_string());
        for dep in &descriptor.dependencies {
            self.visit_all(dep, order, done, visiting)?;
        }
        visiting.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Order a user selection for execution.
    ///
    /// Selection order is kept, except that a plugin runs after any selected
    /// plugin it depends on. Dependencies outside the selection are reported,
    /// never added. Unknown names stay in place so the caller can report them.
    pub fn order_selection(&self, selected: &[String]) -> Result<OrderedSelection> {
        let names: Vec<String> = selected.iter().map(|s| normalize_name(s)).collect();
        let selected_set: HashSet<&str> = names.iter().map(String::as_str).collect();

        let mut result = OrderedSelection::default();
        let mut done = HashSet::new();
        let mut visiting = Vec::new();

        for name in &names {
            self.visit_selected(name, &selected_set, &mut result, &mut done, &mut visiting)?;
        }
        Ok(result)
    }

    fn visit_selected(
        &self,
        name: &str,
        selected: &HashSet<&str>,
        result: &mut OrderedSelection,
        done: &mut HashSet<String>,
        visiting: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(cycle_error(name, visiting));
        }

        if let Some(descriptor) = self.lookup(name) {
            visiting.push(name.to_string());
            for dep in &descriptor.dependencies {
                if selected.contains(dep.as_str()) {
                    self.visit_selected(dep, selected, result, done, visiting)?;
                } else {
                    result
                        .unselected_dependencies
                        .push((name.to_string(), dep.clone()));
                }
            }
            visiting.pop();
        }

        done.insert(name.to_string());
        result.order.push(name.to_string());
        Ok(())
    }
}

fn cycle_error(name: &str, visiting: &[String]) -> Error {
    let mut path = visiting.to_vec();
    path.push(name.to_string());
    Error::PluginInvalid {
        name: name.to_string(),
        reason: format!("dependency cycle: {}", path.join(" -> ")),
    }
}
