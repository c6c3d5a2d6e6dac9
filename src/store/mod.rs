//! Versioned, content-addressed tree storage
//!
//! The stage cache talks to storage only through [`ObjectStore`].
//! [`LocalStore`] is the single-machine implementation kept on local disk.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   config                       format version
//!   objects/<2 hex>/<id>.<kind>  file, tree and commit objects
//!   refs/heads/<ref>             commit id per ref
//!   tmp/                         staging for atomic writes
//! ```

pub mod diff;
pub mod local;
pub mod object;

pub use diff::{Changes, FlatTree, Node};
pub use local::LocalStore;
pub use object::{Commit, ObjectId, ObjectKind, Tree, TreeEntry};

use crate::checksum::Digest;
use crate::error::CacheResult;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::Metadata;
use std::path::Path;

/// Decides whether a non-directory entry is written into a tree.
///
/// Receives the entry's path relative to the written directory and its
/// (not followed) metadata.
pub type EntryFilter<'a> = &'a dyn Fn(&Path, &Metadata) -> bool;

/// Options for writing a directory into the store
#[derive(Clone, Copy, Default)]
pub struct WriteOptions<'a> {
    /// Drop extended attributes from written entries
    pub strip_xattrs: bool,
    /// Skip entries the filter rejects; directories are always kept
    pub filter: Option<EntryFilter<'a>>,
}

/// What to do with files already present in a checkout target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteMode {
    /// Fail if a path already exists
    #[default]
    None,
    /// Replace existing files, keep files the tree does not mention
    UnionFiles,
}

/// Options for materializing a commit on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutOptions {
    pub overwrite: OverwriteMode,
    /// Hard-link regular files to store objects instead of copying
    pub hardlink: bool,
}

/// Totals reported by a prune
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub objects_total: usize,
    pub objects_pruned: usize,
    pub bytes_pruned: u64,
}

/// Storage operations the stage cache depends on
pub trait ObjectStore {
    /// Resolve a ref to the commit it points at
    fn resolve(&self, refname: &str) -> CacheResult<Option<ObjectId>>;

    /// Load a commit object
    fn read_commit(&self, id: &ObjectId) -> CacheResult<Commit>;

    /// Load only the checksum a commit was recorded with
    fn read_commit_subject(&self, id: &ObjectId) -> CacheResult<Digest> {
        Ok(self.read_commit(id)?.subject)
    }

    /// Compare two stored trees; `None` stands for the empty tree
    fn diff_trees(&self, from: Option<&ObjectId>, to: &ObjectId) -> CacheResult<Changes>;

    /// Compare a stored tree against a live directory
    fn diff_tree_dir(&self, from: &ObjectId, dir: &Path) -> CacheResult<Changes>;

    /// Materialize a commit's tree into `target`
    fn checkout(&self, commit: &ObjectId, target: &Path, options: CheckoutOptions)
        -> CacheResult<()>;

    /// Skip syncing checked-out files to disk
    fn set_disable_fsync(&mut self, disable: bool);

    /// Open a write transaction
    fn begin_transaction(&mut self) -> CacheResult<()>;

    /// Write a directory's contents, returning the root tree id
    fn write_directory(&mut self, dir: &Path, options: WriteOptions<'_>) -> CacheResult<ObjectId>;

    /// Write a commit object for an already written tree
    fn write_commit(
        &mut self,
        parent: Option<&ObjectId>,
        subject: &Digest,
        body: &str,
        tree: &ObjectId,
    ) -> CacheResult<ObjectId>;

    /// Stage a ref update, applied when the transaction commits
    fn transaction_set_ref(&mut self, refname: &str, commit: &ObjectId) -> CacheResult<()>;

    /// Make every write of the open transaction durable and apply its refs
    fn commit_transaction(&mut self) -> CacheResult<()>;

    /// Drop the open transaction's staged ref updates
    fn abort_transaction(&mut self) -> CacheResult<()>;

    /// Point a ref at a commit, or delete it with `None`, outside any transaction
    fn set_ref_immediate(&mut self, refname: &str, commit: Option<&ObjectId>) -> CacheResult<()>;

    /// Delete a ref; deleting a missing ref is not an error
    fn delete_ref(&mut self, refname: &str) -> CacheResult<()> {
        self.set_ref_immediate(refname, None)
    }

    /// Names of refs beneath `prefix/`, relative to it
    fn list_refs(&self, prefix: &str) -> CacheResult<BTreeSet<String>>;

    /// Delete every object no ref can reach
    fn prune_unreachable(&mut self) -> CacheResult<PruneStats>;
}
