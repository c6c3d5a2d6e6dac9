//! Gc command - prune objects no ref reaches

use crate::config::{Config, ConfigManager};
use crate::error::CacheResult;
use crate::store::{LocalStore, ObjectStore};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the gc command
pub async fn execute(config: &Config) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let mut store = LocalStore::open(&ConfigManager::cache_dir(config))?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Pruning unreachable objects...");

    match store.prune_unreachable() {
        Ok(stats) => {
            spinner.stop(&format!(
                "Pruned {} of {} objects ({})",
                stats.objects_pruned,
                stats.objects_total,
                ui::format_bytes(stats.bytes_pruned)
            ));
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Prune failed");
            Err(e)
        }
    }
}
