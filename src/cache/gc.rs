//! Removal of stale stage refs

use super::engine::StageCache;
use crate::error::{CacheError, CacheResult};
use crate::store::{ObjectStore, PruneStats};
use serde::Serialize;
use tracing::{debug, info};

/// What a collection removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Full names of the deleted stage refs
    pub removed_refs: Vec<String>,
    pub prune: PruneStats,
}

impl<S: ObjectStore> StageCache<S> {
    /// Delete refs of stages this run never looked up, then prune the store.
    ///
    /// Run after the last stage; until then every stage not yet reached
    /// counts as unused.
    pub fn collect(&mut self) -> CacheResult<GcReport> {
        let mut report = GcReport::default();

        for unused in std::mem::take(&mut self.unused_stages) {
            let refname = format!("{}/{}", self.branch, unused);
            debug!("Removing unused ref {}", refname);
            self.store
                .delete_ref(&refname)
                .map_err(|e| CacheError::Gc(format!("deleting {}: {}", refname, e)))?;
            report.removed_refs.push(refname);
        }

        info!("Pruning cache");
        report.prune = self
            .store
            .prune_unreachable()
            .map_err(|e| CacheError::Gc(e.to_string()))?;

        info!(
            "Pruned {} of {} objects ({} bytes)",
            report.prune.objects_pruned, report.prune.objects_total, report.prune.bytes_pruned
        );
        Ok(report)
    }
}
