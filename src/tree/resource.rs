//! Abstract workspace-side resource tree.
//!
//! The traversal engine only needs existence, kind and sorted child names
//! from the workspace model; everything else about resources stays with the
//! external workspace collaborator.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use crate::path::path_key;

/// The workspace-side view a unified traversal merges against.
pub trait ResourceTree {
    /// Whether the workspace tree has a resource at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether the resource at `path` can hold children.
    fn is_container(&self, path: &Path) -> bool;

    /// Sorted names of the workspace children of `path`.
    fn child_names(&self, path: &Path) -> Vec<String>;
}

/// In-memory resource tree.
///
/// Inserting a resource creates its missing ancestors as containers; the
/// root is always a container.
#[derive(Debug, Default)]
pub struct MemoryResourceTree {
    /// Child names per container path key.
    children: BTreeMap<String, BTreeSet<String>>,
    containers: BTreeSet<String>,
    leaves: BTreeSet<String>,
}

impl MemoryResourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container resource (and its ancestors) at `path`.
    pub fn insert_container(&mut self, path: &Path) {
        let key = self.insert_ancestors(path);
        if key != "/" {
            self.containers.insert(key);
        }
    }

    /// Adds a leaf resource at `path`, creating ancestors as containers.
    pub fn insert_leaf(&mut self, path: &Path) {
        let key = self.insert_ancestors(path);
        if key != "/" {
            self.leaves.insert(key);
        }
    }

    /// Registers every segment of `path` under its parent, marking all but
    /// the last as containers. Returns the key of `path` itself.
    fn insert_ancestors(&mut self, path: &Path) -> String {
        let mut key = String::from("/");
        let mut last = key.clone();
        for component in path.components() {
            if let Component::Normal(name) = component {
                let name = name.to_string_lossy().into_owned();
                self.children
                    .entry(last.clone())
                    .or_default()
                    .insert(name.clone());
                if key.len() > 1 {
                    key.push('/');
                }
                key.push_str(&name);
                // Every parent along the way is a container; the final
                // segment is classified by the caller.
                self.containers.insert(last.clone());
                last = key.clone();
            }
        }
        key
    }
}

impl ResourceTree for MemoryResourceTree {
    fn exists(&self, path: &Path) -> bool {
        let key = path_key(path);
        key == "/" || self.containers.contains(&key) || self.leaves.contains(&key)
    }

    fn is_container(&self, path: &Path) -> bool {
        let key = path_key(path);
        key == "/" || self.containers.contains(&key)
    }

    fn child_names(&self, path: &Path) -> Vec<String> {
        self.children
            .get(&path_key(path))
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}
