//! # Catalog
//!
//! Registry of named cleanup operations.
//!
//! A [`PluginDescriptor`] pairs a typed [`Plugin`] with the metadata used to
//! build selection menus: a free-form category, an admin flag, a version and
//! the names of plugins it depends on. The [`Catalog`] is an explicit value
//! built once at startup and passed by reference to whoever needs it.
//!
//! ## Example
//!
//! ```ignore
//! use catalog::{Catalog, PluginDescriptor};
//! use std::sync::Arc;
//!
//! let mut catalog = Catalog::new();
//! catalog.register(PluginDescriptor::new("npm-cache", "package-managers", Arc::new(my_plugin)));
//!
//! for (category, names) in catalog.list_by_category() {
//!     println!("{category}: {}", names.join(", "));
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod plugin;

pub use catalog::{Catalog, OrderedSelection, PREFERRED_CATEGORIES, normalize_name};
pub use error::{Error, Result};
pub use plugin::{ExecContext, Plugin, PluginDescriptor, Removal};
