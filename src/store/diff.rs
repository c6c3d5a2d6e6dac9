//! Tree comparison
//!
//! Both sides of a diff are flattened into a map of relative path to
//! [`Node`]; the comparison itself never touches the store or the disk.

use super::object::ObjectId;
use serde::Serialize;
use std::collections::BTreeMap;

/// What a path holds, as far as a diff cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File { mode: u32, id: ObjectId },
    Symlink { target: String },
}

/// Flattened tree: relative path (with `/` separators) to node
pub type FlatTree = BTreeMap<String, Node>;

/// Paths that differ between two trees, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Changes {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl Changes {
    /// True when nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Added and modified paths, the set a consumer has to re-process
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

/// Compare two flattened trees.
///
/// A path whose node kind, content, mode or symlink target differs is
/// modified. Directories present on both sides are never modified; their
/// contents are compared individually.
pub fn diff_flat(from: &FlatTree, to: &FlatTree) -> Changes {
    let mut changes = Changes::default();

    for (path, old) in from {
        match to.get(path) {
            None => changes.removed.push(path.clone()),
            Some(new) if new != old => changes.modified.push(path.clone()),
            Some(_) => {}
        }
    }

    for path in to.keys() {
        if !from.contains_key(path) {
            changes.added.push(path.clone());
        }
    }

    changes
}
