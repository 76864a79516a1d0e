// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::pattern_type_mismatch)]

use core::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[cfg(test)]
mod tests {
    mod core;
}

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: Arc<str>, registry: Arc<str> },
    InvalidName { name: Arc<str>, registry: Arc<str> },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{registry} registration failed: The name '{name}' is invalid (empty or whitespace-only names are not allowed).")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: Arc::from(name),
            registry: Arc::from(registry_name),
        })
    } else {
        Ok(())
    }
}

/// Thread-safe registry of named items.
///
/// Items are shared as `Arc<T>`, so trait objects such as `Registry<dyn ExportTarget>` can be
/// stored directly. Lookups hand out clones of the `Arc` and never hold a lock across calls
/// into the item.
pub struct Registry<T: ?Sized> {
    inner: DashMap<Arc<str>, Arc<T>>,
    name: Arc<str>,
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("items", &self.list_names())
            .finish()
    }
}

impl<T: ?Sized> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: DashMap::new(),
            name: registry_name.into(),
        }
    }

    /// Get the name of this registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item with a given name. Returns Err if name already exists.
    pub fn register(&self, name: impl Into<Arc<str>>, item: Arc<T>) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, &self.name)?;

        match self.inner.entry(name) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyExists {
                name: e.key().clone(),
                registry: self.name.clone(),
            }),
            Entry::Vacant(e) => {
                log::debug!("{}: registered `{}`", self.name, e.key());
                e.insert(item);
                Ok(())
            }
        }
    }

    /// Retrieve an item by name, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.inner.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove an item by name. Returns the removed item if it existed.
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.inner.remove(name).map(|(_, v)| v)
    }

    /// List all registered item names, sorted.
    pub fn list_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clear all items from the registry.
    pub fn clear(&self) {
        self.inner.clear();
    }
}
