//! Disk Clean Task
//!
//! Background task that periodically runs a clean pass on the disk cache.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::codec::ImageCodec;

/// Shortest interval between passes; a configured 0 is raised to this.
pub const MIN_CLEAN_INTERVAL_SECS: u64 = 1;

fn clean_interval(clean_interval_secs: u64) -> Duration {
    Duration::from_secs(clean_interval_secs.max(MIN_CLEAN_INTERVAL_SECS))
}

/// Spawns a background task that periodically cleans the disk cache.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between passes. Each pass is queued on the cache's disk lane, so it is
/// ordered with the stores and removals around it and picks up the age and
/// size limits in effect at that moment.
///
/// # Arguments
/// * `cache` - Handle to the cache to clean
/// * `clean_interval_secs` - Interval in seconds between passes, at least
///   [`MIN_CLEAN_INTERVAL_SECS`]
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = ImageCache::new(PassthroughCodec, CacheConfig::from_env());
/// let clean_handle = spawn_clean_task(cache.clone(), 3600);
/// // Later, during shutdown:
/// clean_handle.abort();
/// ```
pub fn spawn_clean_task<C: ImageCodec>(
    cache: ImageCache<C>,
    clean_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = clean_interval(clean_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting disk clean task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.clean_disk().await {
                Ok(report) if report.removed() > 0 => {
                    info!(
                        "Disk clean: removed {} files ({} bytes)",
                        report.removed(),
                        report.bytes_freed
                    );
                }
                Ok(_) => debug!("Disk clean: nothing to remove"),
                Err(e) => warn!(error = %e, "Disk clean failed"),
            }
        }
    })
}
