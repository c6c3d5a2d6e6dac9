//! Stage cache engine
//!
//! Memoizes the working directory after each stage of an ordered build.
//! The cache starts enabled; the first miss disables it for the rest of the
//! instance's life, because every later stage builds on output that no
//! longer comes from the cache.
//!
//! # Lifecycle
//!
//! | State | Lookup | Leaves by |
//! |-------|--------|-----------|
//! | Enabled | compares the stage's stored checksum | first miss, or `ensure_checked_out` |
//! | Disabled | always misses | never |

use super::refs::{escape_stage, stage_ref};
use crate::checksum::{Checksum, Digest};
use crate::error::{CacheError, CacheResult};
use crate::fsutil;
use crate::store::{CheckoutOptions, LocalStore, ObjectId, ObjectStore, OverwriteMode, WriteOptions};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Settings for opening a stage cache on a local store
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Object store location, created if missing
    pub store_dir: PathBuf,
    /// Working directory the stages build into
    pub app_dir: PathBuf,
    /// Lineage the stage refs live under
    pub branch: String,
    /// Share checked-out files with the store through hard links
    pub hardlinks: bool,
}

/// Result of looking up a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The stored snapshot matches the current checksum
    Hit,
    /// The stage has to be built
    Miss,
}

impl LookupOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

impl fmt::Display for LookupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// Cache of build stages for one branch and working directory
pub struct StageCache<S: ObjectStore = LocalStore> {
    pub(super) store: S,
    pub(super) app_dir: PathBuf,
    pub(super) branch: String,
    hardlinks: bool,
    checksum: Checksum,
    stage: Option<String>,
    /// Escaped stage names found at open and not looked up since
    pub(super) unused_stages: BTreeSet<String>,
    pub(super) last_parent: Option<ObjectId>,
    disabled: bool,
}

impl StageCache<LocalStore> {
    /// Open (or create) the local store and bind it to a branch
    pub fn open(options: &CacheOptions) -> CacheResult<Self> {
        let store = LocalStore::create(&options.store_dir)?;
        Self::with_store(
            store,
            options.app_dir.clone(),
            options.branch.clone(),
            options.hardlinks,
        )
    }
}

impl<S: ObjectStore> StageCache<S> {
    /// Bind an already opened store to a branch
    pub fn with_store(
        mut store: S,
        app_dir: PathBuf,
        branch: String,
        hardlinks: bool,
    ) -> CacheResult<Self> {
        // Checkouts are transient; commits are synced at transaction end
        store.set_disable_fsync(true);

        // Older caches used the bare branch name as a ref
        store.delete_ref(&branch)?;

        let unused_stages = store.list_refs(&branch)?;
        debug!(
            "Opened cache for {} with {} existing stages",
            branch,
            unused_stages.len()
        );

        Ok(Self {
            store,
            app_dir,
            branch,
            hardlinks,
            checksum: Checksum::new(),
            stage: None,
            unused_stages,
            last_parent: None,
            disabled: false,
        })
    }

    /// The input accumulator, shared by every stage of this cache
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Mutable access for absorbing inputs
    pub fn checksum_mut(&mut self) -> &mut Checksum {
        &mut self.checksum
    }

    /// Digest over all input absorbed since the cache was opened
    pub fn current_digest(&self) -> Digest {
        self.checksum.current_digest()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Stage named by the most recent lookup
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// Commit of the latest hit or commit
    pub fn last_parent(&self) -> Option<&ObjectId> {
        self.last_parent.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Escaped names of stages present before this run and not looked up yet
    pub fn unused_stages(&self) -> &BTreeSet<String> {
        &self.unused_stages
    }

    /// True once lookups are over and the working directory is authoritative
    pub fn has_checkout(&self) -> bool {
        self.disabled
    }

    /// Stop using the cache without checking anything out
    pub fn disable_lookups(&mut self) {
        self.disabled = true;
    }

    /// Look up `stage` against the current checksum.
    ///
    /// On a miss the working directory is reset to the last hit, or emptied
    /// when nothing hit before, and every later lookup misses. An error
    /// means that reset failed and the working directory can no longer be
    /// trusted.
    pub fn lookup(&mut self, stage: &str) -> CacheResult<LookupOutcome> {
        self.stage = Some(stage.to_string());
        self.unused_stages.remove(&escape_stage(stage));

        if self.disabled {
            return Ok(LookupOutcome::Miss);
        }

        let refname = stage_ref(&self.branch, stage);
        let current = self.checksum.current_digest();

        if let Some(commit) = self.matching_commit(&refname, &current) {
            debug!("Cache hit for {} ({})", stage, commit.short());
            self.last_parent = Some(commit);
            return Ok(LookupOutcome::Hit);
        }

        self.disabled = true;
        if let Some(parent) = self.last_parent {
            info!("Cache miss, checking out last cache hit");
            self.checkout_clean(&parent)?;
        } else {
            // Leftovers of an earlier build must not leak into the first commit
            debug!("Cache miss for {}, nothing cached before it", stage);
            fsutil::recreate_dir(&self.app_dir).map_err(|e| CacheError::checkout("empty tree", e))?;
        }

        Ok(LookupOutcome::Miss)
    }

    /// Commit `refname` points at, if its recorded checksum is `current`
    fn matching_commit(&self, refname: &str, current: &Digest) -> Option<ObjectId> {
        let commit = match self.store.resolve(refname) {
            Ok(Some(commit)) => commit,
            Ok(None) => {
                debug!("No cached commit for {}", refname);
                return None;
            }
            Err(e) => {
                debug!("Failed to resolve {}: {}", refname, e);
                return None;
            }
        };

        match self.store.read_commit_subject(&commit) {
            Ok(subject) if subject == *current => Some(commit),
            Ok(subject) => {
                debug!(
                    "Checksum mismatch for {}: stored {}, current {}",
                    refname, subject, current
                );
                None
            }
            Err(e) => {
                debug!("Failed to read commit {}: {}", commit.short(), e);
                None
            }
        }
    }

    /// Make sure the working directory holds the cached result.
    ///
    /// Needed when every stage hit, since hits never touch the disk. Ends
    /// the lookup phase either way.
    pub fn ensure_checked_out(&mut self) -> CacheResult<()> {
        if self.has_checkout() {
            return Ok(());
        }
        self.disabled = true;

        if let Some(parent) = self.last_parent {
            info!("Everything cached, checking out from cache");
            self.checkout_clean(&parent)?;
        }
        Ok(())
    }

    /// Replace the working directory with `commit`'s tree
    fn checkout_clean(&self, commit: &ObjectId) -> CacheResult<()> {
        let started = Instant::now();
        fsutil::recreate_dir(&self.app_dir).map_err(|e| CacheError::checkout(commit, e))?;

        let options = CheckoutOptions {
            overwrite: OverwriteMode::UnionFiles,
            hardlink: self.hardlinks,
        };
        self.store
            .checkout(commit, &self.app_dir, options)
            .map_err(|e| CacheError::checkout(commit, e))?;

        debug!(
            "Checked out {} in {:.1} sec",
            commit.short(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Snapshot the working directory as the current stage's result.
    ///
    /// Call only after the stage missed and was built; a commit after a hit
    /// is not rejected but records the same checksum again. Returns the new
    /// commit, which becomes the parent of the next one.
    pub fn commit(&mut self, body: &str) -> CacheResult<ObjectId> {
        let stage = self.stage.clone().ok_or(CacheError::NoStage)?;
        let commit_error = |e: CacheError| CacheError::Commit {
            stage: stage.clone(),
            reason: e.to_string(),
        };

        info!("Committing stage {} to cache", stage);
        let started = Instant::now();

        // Identical content must commit identically whatever the build's clock said
        fsutil::zero_mtime(&self.app_dir).map_err(commit_error)?;

        self.store.begin_transaction().map_err(commit_error)?;
        let (commit, deduped) = match self.write_stage_commits(&stage, body) {
            Ok(ids) => ids,
            Err(e) => {
                if let Err(abort) = self.store.abort_transaction() {
                    warn!("Failed to abort transaction: {}", abort);
                }
                return Err(commit_error(e));
            }
        };

        info!(
            "Cache commit {} took {:.1} sec",
            commit.short(),
            started.elapsed().as_secs_f64()
        );
        self.last_parent = Some(commit);

        if self.hardlinks {
            let started = Instant::now();
            debug!("Checking out cache");
            let options = CheckoutOptions {
                overwrite: OverwriteMode::UnionFiles,
                hardlink: true,
            };
            self.store
                .checkout(&deduped, &self.app_dir, options)
                .map_err(|e| CacheError::checkout(deduped, e))?;
            debug!(
                "Checkout took {:.1} sec",
                started.elapsed().as_secs_f64()
            );
        }

        Ok(commit)
    }

    /// Write the full and the new-content-only snapshots and the stage ref.
    ///
    /// Runs inside an open transaction and commits it.
    fn write_stage_commits(
        &mut self,
        stage: &str,
        body: &str,
    ) -> CacheResult<(ObjectId, ObjectId)> {
        let digest = self.checksum.current_digest();

        let tree = self.store.write_directory(
            &self.app_dir,
            WriteOptions {
                strip_xattrs: true,
                filter: None,
            },
        )?;
        let commit = self
            .store
            .write_commit(self.last_parent.as_ref(), &digest, body, &tree)?;
        debug!("Cache commit checksum: {}", commit);

        self.store
            .transaction_set_ref(&stage_ref(&self.branch, stage), &commit)?;

        // Files already linked from the store are skipped; only new content
        let unshared = |_: &Path, metadata: &Metadata| fsutil::is_unshared_file(metadata);
        let deduped_tree = self.store.write_directory(
            &self.app_dir,
            WriteOptions {
                strip_xattrs: true,
                filter: Some(&unshared),
            },
        )?;
        let deduped = self.store.write_commit(None, &digest, body, &deduped_tree)?;
        debug!("Cache commit checksum (new files only): {}", deduped);

        self.store.commit_transaction()?;
        Ok((commit, deduped))
    }
}

impl<S: ObjectStore> fmt::Debug for StageCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageCache")
            .field("branch", &self.branch)
            .field("app_dir", &self.app_dir)
            .field("stage", &self.stage)
            .field("last_parent", &self.last_parent)
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn options(dir: &TempDir, hardlinks: bool) -> CacheOptions {
        CacheOptions {
            store_dir: dir.path().join("cache"),
            app_dir: dir.path().join("app"),
            branch: "app/org.test.App/x86_64".to_string(),
            hardlinks,
        }
    }

    fn build_stage(cache: &mut StageCache, name: &str, input: &str) -> LookupOutcome {
        cache.checksum_mut().absorb_str(Some(input));
        let outcome = cache.lookup(name).unwrap();
        if !outcome.is_hit() {
            fs::create_dir_all(cache.app_dir()).unwrap();
            fs::write(cache.app_dir().join(name), input).unwrap();
            cache.commit(&format!("stage {}", name)).unwrap();
        }
        outcome
    }

    #[test]
    fn empty_store_misses_and_disables() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, false)).unwrap();

        assert_eq!(cache.lookup("init").unwrap(), LookupOutcome::Miss);
        assert!(cache.has_checkout());
        assert!(cache.last_parent().is_none());
    }

    #[test]
    fn commit_then_hit_in_fresh_instance() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            assert_eq!(build_stage(&mut cache, "init", "a"), LookupOutcome::Miss);
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.checksum_mut().absorb_str(Some("a"));
        assert_eq!(cache.lookup("init").unwrap(), LookupOutcome::Hit);
        assert!(!cache.has_checkout());
        assert!(cache.last_parent().is_some());
    }

    #[test]
    fn different_input_misses() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.checksum_mut().absorb_str(Some("b"));
        assert_eq!(cache.lookup("init").unwrap(), LookupOutcome::Miss);
    }

    #[test]
    fn miss_is_sticky() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "build", "b");
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        // Unknown stage first: misses and disables
        assert_eq!(cache.lookup("extra").unwrap(), LookupOutcome::Miss);
        cache.checksum_mut().absorb_str(Some("a"));
        assert_eq!(cache.lookup("init").unwrap(), LookupOutcome::Miss);
    }

    #[test]
    fn miss_after_hit_restores_last_hit() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "build", "b");
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        let app = cache.app_dir().to_path_buf();
        fs::write(app.join("scratch"), "leftover").unwrap();

        assert_eq!(build_stage(&mut cache, "init", "a"), LookupOutcome::Hit);
        assert_eq!(build_stage(&mut cache, "build", "X"), LookupOutcome::Miss);

        // The miss reset the directory to "init" before "build" ran again
        assert!(!app.join("scratch").exists());
        assert_eq!(fs::read_to_string(app.join("init")).unwrap(), "a");
        assert_eq!(fs::read_to_string(app.join("build")).unwrap(), "X");
    }

    #[test]
    fn first_miss_starts_from_empty_directory() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "finish", "b");
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        assert_eq!(build_stage(&mut cache, "init", "changed"), LookupOutcome::Miss);

        let commit = *cache.last_parent().unwrap();
        let tree = cache.store().read_commit(&commit).unwrap().tree;
        let paths: Vec<_> = cache.store().flatten_tree(&tree).unwrap().into_keys().collect();
        assert_eq!(paths, vec!["init"]);
        assert!(!dir.path().join("app/finish").exists());
    }

    fn remove_file_objects(dir: &TempDir) {
        for entry in walkdir::WalkDir::new(dir.path().join("cache/objects")) {
            let entry = entry.unwrap();
            if entry.path().extension().is_some_and(|ext| ext == "file") {
                fs::remove_file(entry.path()).unwrap();
            }
        }
    }

    #[test]
    fn missing_object_on_miss_is_fatal() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "build", "b");
        }
        remove_file_objects(&dir);

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.checksum_mut().absorb_str(Some("a"));
        assert!(cache.lookup("init").unwrap().is_hit());

        cache.checksum_mut().absorb_str(Some("X"));
        let err = cache.lookup("build").unwrap_err();
        assert!(matches!(err, CacheError::Checkout { .. }));
        assert!(err.is_fatal());
        assert!(cache.has_checkout());
    }

    #[test]
    fn missing_object_on_final_checkout_is_fatal() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
        }
        remove_file_objects(&dir);

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.checksum_mut().absorb_str(Some("a"));
        assert!(cache.lookup("init").unwrap().is_hit());

        let err = cache.ensure_checked_out().unwrap_err();
        assert!(matches!(err, CacheError::Checkout { .. }));
        assert!(err.is_fatal());
        assert!(cache.has_checkout());
    }

    #[test]
    fn ensure_checked_out_after_all_hits() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "build", "b");
        }
        fs::remove_dir_all(dir.path().join("app")).unwrap();

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        assert!(build_stage(&mut cache, "init", "a").is_hit());
        assert!(build_stage(&mut cache, "build", "b").is_hit());
        assert!(!dir.path().join("app").exists());

        cache.ensure_checked_out().unwrap();
        assert!(cache.has_checkout());
        assert_eq!(
            fs::read_to_string(dir.path().join("app/build")).unwrap(),
            "b"
        );

        // Idempotent
        cache.ensure_checked_out().unwrap();
    }

    #[test]
    fn ensure_checked_out_without_parent_only_disables() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.ensure_checked_out().unwrap();
        assert!(cache.has_checkout());
        assert!(!dir.path().join("app").exists());
    }

    #[test]
    fn commit_without_stage_fails() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        assert!(matches!(cache.commit("body"), Err(CacheError::NoStage)));
    }

    #[test]
    fn commit_links_parent_and_records_digest() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        build_stage(&mut cache, "init", "a");
        let first = *cache.last_parent().unwrap();
        build_stage(&mut cache, "build", "b");
        let second = *cache.last_parent().unwrap();

        let commit = cache.store().read_commit(&second).unwrap();
        assert_eq!(commit.parent, Some(first));
        assert_eq!(commit.subject, cache.current_digest());
        assert_eq!(commit.body, "stage build");
        assert_eq!(
            cache
                .store()
                .resolve("app/org.test.App/x86_64/build")
                .unwrap(),
            Some(second)
        );
    }

    #[test]
    fn commit_failure_leaves_no_open_transaction() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        cache.lookup("init").unwrap();

        fs::remove_dir_all(cache.app_dir()).unwrap();
        let err = cache.commit("body").unwrap_err();
        assert!(matches!(err, CacheError::Commit { .. }));
        assert!(!cache.store().in_transaction());
        assert!(cache.last_parent().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn hardlink_commit_shares_files_with_store() {
        let dir = TempDir::new().unwrap();
        let mut cache = StageCache::open(&options(&dir, true)).unwrap();
        build_stage(&mut cache, "init", "a");

        let meta = fs::symlink_metadata(dir.path().join("app/init")).unwrap();
        assert!(!fsutil::is_unshared_file(&meta));
    }

    #[test]
    fn legacy_branch_ref_is_removed() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir, false);
        {
            let mut cache = StageCache::open(&opts).unwrap();
            build_stage(&mut cache, "init", "a");
        }
        let mut store = LocalStore::open(&opts.store_dir).unwrap();
        let commit = store.resolve("app/org.test.App/x86_64/init").unwrap().unwrap();
        store.delete_ref("app/org.test.App/x86_64/init").unwrap();
        store
            .set_ref_immediate("app/org.test.App/x86_64", Some(&commit))
            .unwrap();
        drop(store);

        let cache = StageCache::open(&opts).unwrap();
        assert_eq!(cache.store().resolve("app/org.test.App/x86_64").unwrap(), None);
        assert!(cache.unused_stages().is_empty());
    }

    #[test]
    fn lookup_marks_stage_used() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = StageCache::open(&options(&dir, false)).unwrap();
            build_stage(&mut cache, "init", "a");
            build_stage(&mut cache, "post install", "b");
        }

        let mut cache = StageCache::open(&options(&dir, false)).unwrap();
        assert_eq!(cache.unused_stages().len(), 2);
        cache.lookup("post install").unwrap();
        let unused: Vec<_> = cache.unused_stages().iter().cloned().collect();
        assert_eq!(unused, vec!["init".to_string()]);
    }
}
