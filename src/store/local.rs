//! On-disk object store
//!
//! Objects are written once to a temp file, renamed into place and made
//! read-only, so a checkout can safely hard-link them. Ref updates made
//! inside a transaction are held in memory until the transaction commits.

use super::diff::{diff_flat, Changes, FlatTree, Node};
use super::object::{
    canonical_mode, file_object_id, Commit, ObjectId, ObjectKind, Tree, TreeEntry, MODE_EXEC,
};
use super::{CheckoutOptions, ObjectStore, OverwriteMode, PruneStats, WriteOptions};
use crate::checksum::Digest;
use crate::error::{CacheError, CacheResult};
use crate::fsutil::{self, rel_string};
use chrono::Utc;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const CONFIG_FILE: &str = "config";
const OBJECTS_DIR: &str = "objects";
const REFS_DIR: &str = "refs/heads";
const TMP_DIR: &str = "tmp";
const STORE_FORMAT_VERSION: u32 = 1;

/// Persistent store metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreConfig {
    version: u32,
    created_by: String,
}

/// Writes belonging to the open transaction
#[derive(Debug, Default)]
struct Transaction {
    refs: BTreeMap<String, ObjectId>,
    written: Vec<PathBuf>,
}

/// Content-addressed store rooted at a local directory
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    disable_fsync: bool,
    transaction: Option<Transaction>,
}

impl LocalStore {
    /// Initialize a store at `root`, creating parent directories as needed.
    ///
    /// An existing store at `root` is opened instead.
    pub fn create(root: &Path) -> CacheResult<Self> {
        if root.join(CONFIG_FILE).exists() {
            return Self::open(root);
        }

        for dir in [OBJECTS_DIR, REFS_DIR, TMP_DIR] {
            fs::create_dir_all(root.join(dir)).map_err(|e| unavailable(root, e))?;
        }

        let config = StoreConfig {
            version: STORE_FORMAT_VERSION,
            created_by: format!("stagecache {}", env!("CARGO_PKG_VERSION")),
        };
        let content = serde_json::to_vec_pretty(&config)?;
        fs::write(root.join(CONFIG_FILE), content).map_err(|e| unavailable(root, e))?;

        debug!("Created object store at {}", root.display());
        Self::open(root)
    }

    /// Open an existing store
    pub fn open(root: &Path) -> CacheResult<Self> {
        let content = fs::read(root.join(CONFIG_FILE)).map_err(|e| unavailable(root, e))?;
        let config: StoreConfig =
            serde_json::from_slice(&content).map_err(|e| CacheError::StoreUnavailable {
                path: root.to_path_buf(),
                reason: format!("unreadable store config: {}", e),
            })?;

        if config.version != STORE_FORMAT_VERSION {
            return Err(CacheError::StoreUnavailable {
                path: root.to_path_buf(),
                reason: format!(
                    "unsupported store format {} (expected {})",
                    config.version, STORE_FORMAT_VERSION
                ),
            });
        }

        // Leftovers from an interrupted write
        let tmp = root.join(TMP_DIR);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).map_err(|e| unavailable(root, e))?;

        Ok(Self {
            root: root.to_path_buf(),
            disable_fsync: false,
            transaction: None,
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a write transaction is open
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn object_path(&self, id: &ObjectId, kind: ObjectKind) -> PathBuf {
        let hex = id.to_hex();
        self.root
            .join(OBJECTS_DIR)
            .join(&hex[..2])
            .join(format!("{}.{}", hex, kind.extension()))
    }

    fn ref_path(&self, refname: &str) -> CacheResult<PathBuf> {
        let valid = !refname.is_empty()
            && refname
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..");
        if !valid {
            return Err(CacheError::InvalidRef(refname.to_string()));
        }
        Ok(self.root.join(REFS_DIR).join(refname))
    }

    fn write_object(
        &mut self,
        id: &ObjectId,
        kind: ObjectKind,
        bytes: &[u8],
        mode: u32,
    ) -> CacheResult<()> {
        let dest = self.object_path(id, kind);
        if dest.exists() {
            return Ok(());
        }

        let transaction = self.transaction.as_mut().ok_or(CacheError::NoTransaction)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
        }

        let tmp = self
            .root
            .join(TMP_DIR)
            .join(format!("{}.{}.partial", id.to_hex(), kind.extension()));
        {
            let mut file = File::create(&tmp)
                .map_err(|e| CacheError::io(format!("creating {}", tmp.display()), e))?;
            file.write_all(bytes)
                .map_err(|e| CacheError::io(format!("writing {}", tmp.display()), e))?;
        }

        set_mode(&tmp, mode & 0o555)?;
        filetime::set_file_mtime(&tmp, FileTime::zero())
            .map_err(|e| CacheError::io(format!("resetting mtime of {}", tmp.display()), e))?;

        fs::rename(&tmp, &dest).map_err(|e| {
            CacheError::io(
                format!("moving object into place ({} -> {})", tmp.display(), dest.display()),
                e,
            )
        })?;

        transaction.written.push(dest);
        Ok(())
    }

    fn read_object(&self, id: &ObjectId, kind: ObjectKind) -> CacheResult<Vec<u8>> {
        let path = self.object_path(id, kind);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::ObjectMissing(format!("{}.{}", id, kind)),
            _ => CacheError::io(format!("reading object {}", path.display()), e),
        })
    }

    /// Load a tree object
    pub fn read_tree(&self, id: &ObjectId) -> CacheResult<Tree> {
        let bytes = self.read_object(id, ObjectKind::Tree)?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::ObjectCorrupt {
            id: id.to_hex(),
            reason: e.to_string(),
        })
    }

    fn write_tree(&mut self, tree: &Tree) -> CacheResult<ObjectId> {
        let bytes = tree.to_bytes()?;
        let id = ObjectId::hash(&bytes);
        self.write_object(&id, ObjectKind::Tree, &bytes, 0o444)?;
        Ok(id)
    }

    fn write_dir_level(
        &mut self,
        root: &Path,
        dir: &Path,
        options: &WriteOptions<'_>,
    ) -> CacheResult<ObjectId> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry
                .map_err(|e| CacheError::Internal(format!("walking {}: {}", dir.display(), e)))?;
            let path = entry.path();
            let name = fsutil::utf8_name(entry.file_name(), path)?.to_string();
            let metadata = entry
                .metadata()
                .map_err(|e| CacheError::Internal(format!("stat {}: {}", path.display(), e)))?;
            let file_type = metadata.file_type();

            if file_type.is_dir() {
                let id = self.write_dir_level(root, path, options)?;
                entries.push(TreeEntry::Dir { name, id });
                continue;
            }

            if let Some(filter) = options.filter {
                let rel = path.strip_prefix(root).unwrap_or(path);
                if !filter(rel, &metadata) {
                    continue;
                }
            }

            if file_type.is_file() {
                let content = fs::read(path)
                    .map_err(|e| CacheError::io(format!("reading {}", path.display()), e))?;
                let mode = canonical_mode(&metadata);
                let id = file_object_id(mode, &content);
                self.write_object(&id, ObjectKind::File, &content, mode)?;
                entries.push(TreeEntry::File { name, mode, id });
            } else if file_type.is_symlink() {
                let target = fs::read_link(path)
                    .map_err(|e| CacheError::io(format!("reading link {}", path.display()), e))?;
                entries.push(TreeEntry::Symlink {
                    name,
                    target: fsutil::utf8_name(target.as_os_str(), path)?.to_string(),
                });
            } else {
                debug!("Skipping special file {}", path.display());
            }
        }

        self.write_tree(&Tree::new(entries))
    }

    /// Flatten a stored tree into relative paths
    pub fn flatten_tree(&self, id: &ObjectId) -> CacheResult<FlatTree> {
        let mut flat = FlatTree::new();
        self.flatten_into(id, "", &mut flat)?;
        Ok(flat)
    }

    fn flatten_into(&self, id: &ObjectId, prefix: &str, flat: &mut FlatTree) -> CacheResult<()> {
        for entry in self.read_tree(id)?.entries {
            let path = if prefix.is_empty() {
                entry.name().to_string()
            } else {
                format!("{}/{}", prefix, entry.name())
            };
            match entry {
                TreeEntry::Dir { id, .. } => {
                    flat.insert(path.clone(), Node::Dir);
                    self.flatten_into(&id, &path, flat)?;
                }
                TreeEntry::File { mode, id, .. } => {
                    flat.insert(path, Node::File { mode, id });
                }
                TreeEntry::Symlink { target, .. } => {
                    flat.insert(path, Node::Symlink { target });
                }
            }
        }
        Ok(())
    }

    fn checkout_tree(
        &self,
        id: &ObjectId,
        dir: &Path,
        options: CheckoutOptions,
    ) -> CacheResult<()> {
        for entry in self.read_tree(id)?.entries {
            let dest = dir.join(entry.name());
            let existing = fs::symlink_metadata(&dest).ok();

            match entry {
                TreeEntry::Dir { id, .. } => {
                    match existing {
                        Some(meta) if meta.is_dir() => {}
                        Some(_) => {
                            self.clear_path(&dest, options)?;
                            create_dir(&dest)?;
                        }
                        None => create_dir(&dest)?,
                    }
                    self.checkout_tree(&id, &dest, options)?;
                }
                TreeEntry::File { mode, id, .. } => {
                    let object = self.object_path(&id, ObjectKind::File);
                    if let Some(meta) = existing {
                        if options.hardlink && same_file(&object, &meta) {
                            continue;
                        }
                        self.clear_path(&dest, options)?;
                    }
                    self.materialize_file(&object, &dest, mode, options)?;
                }
                TreeEntry::Symlink { target, .. } => {
                    if existing.is_some() {
                        self.clear_path(&dest, options)?;
                    }
                    make_symlink(&target, &dest)?;
                }
            }
        }
        Ok(())
    }

    fn clear_path(&self, path: &Path, options: CheckoutOptions) -> CacheResult<()> {
        if options.overwrite == OverwriteMode::None {
            return Err(CacheError::io(
                format!("checking out {}", path.display()),
                std::io::Error::new(ErrorKind::AlreadyExists, "path already exists"),
            ));
        }
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        result.map_err(|e| CacheError::io(format!("replacing {}", path.display()), e))
    }

    fn materialize_file(
        &self,
        object: &Path,
        dest: &Path,
        mode: u32,
        options: CheckoutOptions,
    ) -> CacheResult<()> {
        if options.hardlink {
            match fs::hard_link(object, dest) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound && !object.exists() => {
                    return Err(CacheError::ObjectMissing(object.display().to_string()));
                }
                Err(e) => debug!("Hard link to {} failed ({}), copying", dest.display(), e),
            }
        }

        fs::copy(object, dest).map_err(|e| match e.kind() {
            ErrorKind::NotFound if !object.exists() => {
                CacheError::ObjectMissing(object.display().to_string())
            }
            _ => CacheError::io(format!("copying to {}", dest.display()), e),
        })?;
        set_mode(dest, mode)?;

        if !self.disable_fsync {
            File::open(dest)
                .and_then(|f| f.sync_all())
                .map_err(|e| CacheError::io(format!("syncing {}", dest.display()), e))?;
        }
        Ok(())
    }

    fn all_refs(&self) -> CacheResult<BTreeMap<String, ObjectId>> {
        let refs_root = self.root.join(REFS_DIR);
        let mut refs = BTreeMap::new();
        for entry in WalkDir::new(&refs_root).min_depth(1) {
            let entry = entry.map_err(|e| CacheError::Internal(format!("walking refs: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = rel_string(entry.path().strip_prefix(&refs_root).unwrap_or(entry.path()))?;
            if let Some(id) = self.resolve(&name)? {
                refs.insert(name, id);
            }
        }
        Ok(refs)
    }

    fn write_ref(&self, refname: &str, id: &ObjectId) -> CacheResult<()> {
        let path = self.ref_path(refname)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating ref directory for {}", refname), e))?;
        }
        let tmp = self
            .root
            .join(TMP_DIR)
            .join(format!("ref-{}.partial", refname.replace('/', "_")));
        fs::write(&tmp, format!("{}\n", id))
            .map_err(|e| CacheError::io(format!("writing ref {}", refname), e))?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::io(format!("updating ref {}", refname), e))
    }

    fn remove_ref(&self, refname: &str) -> CacheResult<()> {
        let path = self.ref_path(refname)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => {
                fs::remove_file(&path)
                    .map_err(|e| CacheError::io(format!("deleting ref {}", refname), e))?;
            }
            // A directory here holds refs below this name, not a ref itself
            _ => return Ok(()),
        }

        // Drop now-empty namespace directories
        let refs_root = self.root.join(REFS_DIR);
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == refs_root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn mark_commit(&self, id: &ObjectId, reachable: &mut HashSet<PathBuf>) -> CacheResult<()> {
        let mut next = Some(*id);
        while let Some(commit_id) = next.take() {
            let path = self.object_path(&commit_id, ObjectKind::Commit);
            if !reachable.insert(path) {
                break;
            }
            let commit = match self.read_commit(&commit_id) {
                Ok(commit) => commit,
                Err(CacheError::ObjectMissing(_)) => {
                    warn!("Commit {} is missing, history truncated", commit_id.short());
                    break;
                }
                Err(e) => return Err(e),
            };
            self.mark_tree(&commit.tree, reachable)?;
            next = commit.parent;
        }
        Ok(())
    }

    fn mark_tree(&self, id: &ObjectId, reachable: &mut HashSet<PathBuf>) -> CacheResult<()> {
        if !reachable.insert(self.object_path(id, ObjectKind::Tree)) {
            return Ok(());
        }
        for entry in self.read_tree(id)?.entries {
            match entry {
                TreeEntry::Dir { id, .. } => self.mark_tree(&id, reachable)?,
                TreeEntry::File { id, .. } => {
                    reachable.insert(self.object_path(&id, ObjectKind::File));
                }
                TreeEntry::Symlink { .. } => {}
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn resolve(&self, refname: &str) -> CacheResult<Option<ObjectId>> {
        let path = self.ref_path(refname)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.parse()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // A namespace directory, or a path beneath a legacy ref file
            Err(_) if !path.is_file() => Ok(None),
            Err(e) => Err(CacheError::io(format!("reading ref {}", refname), e)),
        }
    }

    fn read_commit(&self, id: &ObjectId) -> CacheResult<Commit> {
        let bytes = self.read_object(id, ObjectKind::Commit)?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::ObjectCorrupt {
            id: id.to_hex(),
            reason: e.to_string(),
        })
    }

    fn diff_trees(&self, from: Option<&ObjectId>, to: &ObjectId) -> CacheResult<Changes> {
        let old = match from {
            Some(id) => self.flatten_tree(id)?,
            None => FlatTree::new(),
        };
        let new = self.flatten_tree(to)?;
        Ok(diff_flat(&old, &new))
    }

    fn diff_tree_dir(&self, from: &ObjectId, dir: &Path) -> CacheResult<Changes> {
        let old = self.flatten_tree(from)?;
        let new = flatten_dir(dir)?;
        Ok(diff_flat(&old, &new))
    }

    fn checkout(
        &self,
        commit: &ObjectId,
        target: &Path,
        options: CheckoutOptions,
    ) -> CacheResult<()> {
        let tree = self.read_commit(commit)?.tree;
        create_dir(target)?;
        self.checkout_tree(&tree, target, options)?;

        if !options.hardlink {
            fsutil::zero_mtime(target)?;
        }
        Ok(())
    }

    fn set_disable_fsync(&mut self, disable: bool) {
        self.disable_fsync = disable;
    }

    fn begin_transaction(&mut self) -> CacheResult<()> {
        if self.transaction.is_some() {
            return Err(CacheError::TransactionActive);
        }
        self.transaction = Some(Transaction::default());
        Ok(())
    }

    fn write_directory(&mut self, dir: &Path, options: WriteOptions<'_>) -> CacheResult<ObjectId> {
        if self.transaction.is_none() {
            return Err(CacheError::NoTransaction);
        }
        // Extended attributes are never recorded, so `strip_xattrs` always holds
        self.write_dir_level(dir, dir, &options)
    }

    fn write_commit(
        &mut self,
        parent: Option<&ObjectId>,
        subject: &Digest,
        body: &str,
        tree: &ObjectId,
    ) -> CacheResult<ObjectId> {
        let commit = Commit {
            parent: parent.copied(),
            subject: *subject,
            body: body.to_string(),
            tree: *tree,
            timestamp: Utc::now(),
        };
        let bytes = commit.to_bytes()?;
        let id = ObjectId::hash(&bytes);
        self.write_object(&id, ObjectKind::Commit, &bytes, 0o444)?;
        Ok(id)
    }

    fn transaction_set_ref(&mut self, refname: &str, commit: &ObjectId) -> CacheResult<()> {
        self.ref_path(refname)?;
        let transaction = self.transaction.as_mut().ok_or(CacheError::NoTransaction)?;
        transaction.refs.insert(refname.to_string(), *commit);
        Ok(())
    }

    fn commit_transaction(&mut self) -> CacheResult<()> {
        let transaction = self.transaction.take().ok_or(CacheError::NoTransaction)?;

        for path in &transaction.written {
            File::open(path)
                .and_then(|f| f.sync_all())
                .map_err(|e| CacheError::io(format!("syncing {}", path.display()), e))?;
        }

        for (refname, id) in &transaction.refs {
            self.write_ref(refname, id)?;
        }

        debug!(
            "Transaction committed: {} objects, {} refs",
            transaction.written.len(),
            transaction.refs.len()
        );
        Ok(())
    }

    fn abort_transaction(&mut self) -> CacheResult<()> {
        let transaction = self.transaction.take().ok_or(CacheError::NoTransaction)?;
        debug!(
            "Transaction aborted: dropped {} ref updates, {} objects left for prune",
            transaction.refs.len(),
            transaction.written.len()
        );
        Ok(())
    }

    fn set_ref_immediate(&mut self, refname: &str, commit: Option<&ObjectId>) -> CacheResult<()> {
        match commit {
            Some(id) => self.write_ref(refname, id),
            None => self.remove_ref(refname),
        }
    }

    fn list_refs(&self, prefix: &str) -> CacheResult<BTreeSet<String>> {
        let dir = self.ref_path(prefix)?;
        let mut refs = BTreeSet::new();
        if !dir.is_dir() {
            return Ok(refs);
        }
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| CacheError::Internal(format!("walking refs: {}", e)))?;
            if entry.file_type().is_file() {
                refs.insert(rel_string(
                    entry.path().strip_prefix(&dir).unwrap_or(entry.path()),
                )?);
            }
        }
        Ok(refs)
    }

    fn prune_unreachable(&mut self) -> CacheResult<PruneStats> {
        if self.transaction.is_some() {
            return Err(CacheError::TransactionActive);
        }

        let mut reachable = HashSet::new();
        for (refname, id) in self.all_refs()? {
            debug!("Keeping objects reachable from {}", refname);
            self.mark_commit(&id, &mut reachable)?;
        }

        let mut stats = PruneStats::default();
        for entry in WalkDir::new(self.root.join(OBJECTS_DIR)).min_depth(2) {
            let entry = entry.map_err(|e| CacheError::Internal(format!("walking objects: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Only object files are candidates
            let is_object = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ObjectKind::from_extension)
                .is_some();
            if !is_object {
                debug!("Ignoring stray file {}", entry.path().display());
                continue;
            }
            stats.objects_total += 1;
            if reachable.contains(entry.path()) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            fs::remove_file(entry.path())
                .map_err(|e| CacheError::io(format!("pruning {}", entry.path().display()), e))?;
            stats.objects_pruned += 1;
            stats.bytes_pruned += size;
        }

        Ok(stats)
    }
}

/// Flatten a live directory the way its tree would be written
pub fn flatten_dir(dir: &Path) -> CacheResult<FlatTree> {
    let mut flat = FlatTree::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry =
            entry.map_err(|e| CacheError::Internal(format!("walking {}: {}", dir.display(), e)))?;
        let path = entry.path();
        let rel = rel_string(path.strip_prefix(dir).unwrap_or(path))?;
        let file_type = entry.file_type();

        let node = if file_type.is_dir() {
            Node::Dir
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| CacheError::Internal(format!("stat {}: {}", path.display(), e)))?;
            let content = fs::read(path)
                .map_err(|e| CacheError::io(format!("reading {}", path.display()), e))?;
            let mode = canonical_mode(&metadata);
            Node::File {
                mode,
                id: file_object_id(mode, &content),
            }
        } else if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| CacheError::io(format!("reading link {}", path.display()), e))?;
            Node::Symlink {
                target: fsutil::utf8_name(target.as_os_str(), path)?.to_string(),
            }
        } else {
            continue;
        };
        flat.insert(rel, node);
    }
    Ok(flat)
}

fn unavailable(root: &Path, e: std::io::Error) -> CacheError {
    CacheError::StoreUnavailable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    }
}

fn create_dir(path: &Path) -> CacheResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| CacheError::io(format!("creating {}", path.display()), e))?;
    set_mode(path, MODE_EXEC)
}

fn set_mode(path: &Path, mode: u32) -> CacheResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| CacheError::io(format!("setting mode of {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

fn make_symlink(target: &str, dest: &Path) -> CacheResult<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, dest)
            .map_err(|e| CacheError::io(format!("creating symlink {}", dest.display()), e))
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(CacheError::Internal(format!(
            "symlinks are not supported here: {}",
            dest.display()
        )))
    }
}

fn same_file(object: &Path, existing: &fs::Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(object)
            .map(|m| m.dev() == existing.dev() && m.ino() == existing.ino())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = (object, existing);
        false
    }
}
