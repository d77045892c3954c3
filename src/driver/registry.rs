//! Driver registry.
//!
//! An ordered table of named drivers. Resolution scans in registration
//! order and the first driver that accepts an element wins, so specific
//! drivers must be registered before general ones.

use std::fmt;
use std::sync::Arc;

use super::{Driver, builtin};
use crate::dom::Element;

struct Entry {
    name: String,
    driver: Arc<dyn Driver>,
}

/// Name -> driver table. Passed explicitly to each session.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference drivers, most specific first.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register `driver` under `name`. Returns the driver it replaced.
    pub fn register<D: Driver + 'static>(
        &mut self,
        name: &str,
        driver: D,
    ) -> Option<Arc<dyn Driver>> {
        self.register_arc(name, Arc::new(driver))
    }

    /// Register a shared driver.
    ///
    /// Re-registering a name swaps the driver in place: the entry keeps its
    /// position in the resolution order.
    pub fn register_arc(&mut self, name: &str, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            crate::debug!("registry"; "driver `{}` replaced", name);
            return Some(std::mem::replace(&mut entry.driver, driver));
        }
        self.entries.push(Entry {
            name: name.to_string(),
            driver,
        });
        None
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Driver>> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(index).driver)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.driver)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in resolution order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Entries in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Driver>)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.driver))
    }

    /// First driver, in registration order, that accepts `el`.
    pub fn resolve(&self, el: &Element) -> Option<(&str, &Arc<dyn Driver>)> {
        self.iter().find(|(_, driver)| driver.matches(el))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.names())
            .finish()
    }
}
