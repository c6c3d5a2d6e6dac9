//! What stages changed
//!
//! Read-only comparisons between the working directory and commits in the
//! cache's lineage. Extended attributes never take part in a comparison.

use super::engine::StageCache;
use super::refs::stage_ref;
use crate::error::{CacheError, CacheResult};
use crate::store::{Changes, ObjectId, ObjectStore};

impl<S: ObjectStore> StageCache<S> {
    /// Changes in the working directory since the last hit or commit
    pub fn outstanding_changes(&self) -> CacheResult<Changes> {
        let parent = self.last_parent.ok_or(CacheError::NoParent)?;
        let tree = self.store.read_commit(&parent).map_err(diff_error)?.tree;
        self.store
            .diff_tree_dir(&tree, &self.app_dir)
            .map_err(diff_error)
    }

    /// Changes the most recent hit or commit made over its own parent.
    ///
    /// A commit without a parent is compared with the empty tree.
    pub fn changes_since_parent(&self) -> CacheResult<Changes> {
        let current = self.last_parent.ok_or(CacheError::NoParent)?;
        let commit = self.store.read_commit(&current).map_err(diff_error)?;

        let parent_tree = match commit.parent {
            Some(parent) => Some(self.store.read_commit(&parent).map_err(diff_error)?.tree),
            None => None,
        };

        self.store
            .diff_trees(parent_tree.as_ref(), &commit.tree)
            .map_err(diff_error)
    }

    /// Net changes between the cached results of two stages
    pub fn all_changes(&self, from_stage: &str, to_stage: &str) -> CacheResult<Changes> {
        let from = self.resolve_stage(from_stage)?;
        let to = self.resolve_stage(to_stage)?;

        let from_tree = self.store.read_commit(&from).map_err(diff_error)?.tree;
        let to_tree = self.store.read_commit(&to).map_err(diff_error)?.tree;

        self.store
            .diff_trees(Some(&from_tree), &to_tree)
            .map_err(diff_error)
    }

    fn resolve_stage(&self, stage: &str) -> CacheResult<ObjectId> {
        let refname = stage_ref(&self.branch, stage);
        self.store
            .resolve(&refname)?
            .ok_or(CacheError::RefNotFound(refname))
    }
}

fn diff_error(e: CacheError) -> CacheError {
    match e {
        CacheError::Diff(_) => e,
        other => CacheError::Diff(other.to_string()),
    }
}
