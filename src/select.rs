//! Choosing which operations to run

use anyhow::{Context, Result};
use catalog::Catalog;
use dialoguer::{Confirm, MultiSelect};

use crate::coordinator::sweep::SizeMap;
use crate::ui;

pub trait Selector {
    /// Names of the operations to run, in the order chosen
    fn select(&mut self, catalog: &Catalog, sizes: &SizeMap) -> Result<Vec<String>>;

    /// Final go-ahead before anything is deleted
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Category menu, then an operation menu for the chosen categories
#[derive(Debug, Default)]
pub struct InteractiveSelector;

impl Selector for InteractiveSelector {
    fn select(&mut self, catalog: &Catalog, sizes: &SizeMap) -> Result<Vec<String>> {
        let menu = catalog.list_by_category();
        let labels: Vec<String> = menu
            .iter()
            .map(|(category, names)| {
                let total: u64 = names.iter().filter_map(|n| sizes.get(n)).sum();
                format!("{category} ({})", ui::format_size(total))
            })
            .collect();

        let chosen = MultiSelect::new()
            .with_prompt("Categories (space to toggle, enter to continue)")
            .items(&labels)
            .interact()
            .context("Failed to read category selection")?;

        let candidates: Vec<&String> = chosen
            .iter()
            .flat_map(|&i| menu[i].1.iter())
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let labels: Vec<String> = candidates
            .iter()
            .map(|name| operation_label(catalog, sizes, name))
            .collect();
        let defaults: Vec<bool> = candidates
            .iter()
            .map(|name| sizes.get(*name).copied().unwrap_or(0) > 0)
            .collect();

        let picked = MultiSelect::new()
            .with_prompt("Operations")
            .items(&labels)
            .defaults(&defaults)
            .interact()
            .context("Failed to read operation selection")?;

        Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read user input")
    }
}

fn operation_label(catalog: &Catalog, sizes: &SizeMap, name: &str) -> String {
    let size = ui::format_size(sizes.get(name).copied().unwrap_or(0));
    match catalog.lookup(name) {
        Some(d) if d.requires_admin => format!("{name} ({size}, admin)"),
        _ => format!("{name} ({size})"),
    }
}

/// `--quiet`: everything with something to reclaim, no prompts.
///
/// Admin-only operations are included only when running as root.
#[derive(Debug)]
pub struct AutoSelector {
    pub is_admin: bool,
}

impl Selector for AutoSelector {
    fn select(&mut self, catalog: &Catalog, sizes: &SizeMap) -> Result<Vec<String>> {
        Ok(catalog
            .list_by_category()
            .into_iter()
            .flat_map(|(_, names)| names)
            .filter(|name| sizes.get(name).copied().unwrap_or(0) > 0)
            .filter(|name| {
                self.is_admin || catalog.lookup(name).is_some_and(|d| !d.requires_admin)
            })
            .collect())
    }

    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// `--select a,b`: fixed names.
///
/// Unknown names are logged and dropped; it is an error only when none of
/// the names resolve.
#[derive(Debug)]
pub struct ExplicitSelector<C> {
    pub names: Vec<String>,
    /// Who answers the confirmation
    pub confirm: C,
}

impl<C: Selector> Selector for ExplicitSelector<C> {
    fn select(&mut self, catalog: &Catalog, _sizes: &SizeMap) -> Result<Vec<String>> {
        let mut selected: Vec<String> = Vec::new();
        for name in &self.names {
            match catalog.get(name) {
                Ok(descriptor) => {
                    if !selected.contains(&descriptor.name) {
                        selected.push(descriptor.name.clone());
                    }
                }
                Err(e) => log::error!("Skipping {name}: {e}"),
            }
        }
        if selected.is_empty() {
            anyhow::bail!("None of the selected operations exist: {}", self.names.join(", "));
        }
        Ok(selected)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.confirm.confirm(prompt)
    }
}
