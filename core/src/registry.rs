//! Loaded resources, keyed by name.
//!
//! A name maps either to one resource or to a set of named actions
//! (`brand.list`, `brand.get`, ...). A descriptor with an `action` joins the
//! action map of its name; one without an action becomes the single resource
//! for that name. When a descriptor of the other kind arrives for a name that
//! is already taken, the new one replaces the old entry.

use std::collections::BTreeMap;

use crate::resource::Resource;

#[derive(Debug, Clone)]
pub enum RegistryEntry {
    Single(Resource),
    Actions(BTreeMap<String, Resource>),
}

impl RegistryEntry {
    /// The resource for `action`. A single resource answers to any action.
    pub fn action(&self, action: &str) -> Option<&Resource> {
        match self {
            RegistryEntry::Single(resource) => Some(resource),
            RegistryEntry::Actions(actions) => actions.get(action),
        }
    }

    pub fn as_single(&self) -> Option<&Resource> {
        match self {
            RegistryEntry::Single(resource) => Some(resource),
            RegistryEntry::Actions(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ResourceRegistry {
    pub fn insert(&mut self, name: &str, action: Option<&str>, resource: Resource) {
        match action {
            None => {
                if self.entries.contains_key(name) {
                    tracing::warn!(name, "replacing registered resource");
                }
                self.entries.insert(name.to_string(), RegistryEntry::Single(resource));
            }
            Some(action) => {
                let entry = self
                    .entries
                    .entry(name.to_string())
                    .or_insert_with(|| RegistryEntry::Actions(BTreeMap::new()));
                if let RegistryEntry::Single(_) = entry {
                    tracing::warn!(name, action, "replacing single resource with action map");
                    *entry = RegistryEntry::Actions(BTreeMap::new());
                }
                if let RegistryEntry::Actions(actions) = entry {
                    if actions.insert(action.to_string(), resource).is_some() {
                        tracing::warn!(name, action, "replacing registered action");
                    }
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn action(&self, name: &str, action: &str) -> Option<&Resource> {
        self.entries.get(name)?.action(action)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
