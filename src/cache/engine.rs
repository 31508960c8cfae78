//! Cache Engine Module
//!
//! Orchestrates the memory tier and the disk tier.
//!
//! Memory operations happen synchronously on the caller's thread. Every
//! disk operation is queued on the disk lane and reported through a
//! [`Pending`] handle; callers never touch the filesystem themselves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::clean::{self, CleanPolicy, CleanReport};
use crate::cache::{CacheStats, DiskStore, IoLane, MemoryStore, MoveReport, Pending};
use crate::codec::ImageCodec;
use crate::config::{namespace_root, CacheConfig, DEFAULT_NAMESPACE};
use crate::error::{CacheError, Result};

// == Cache Source ==
/// Tier that answered a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Not cached in either tier
    None,
    /// Read from disk and decoded
    Disk,
    /// Served from memory
    Memory,
}

// == Query Outcome ==
/// Answer to [`ImageCache::query`].
#[derive(Debug, Clone)]
pub struct QueryOutcome<I> {
    pub image: Option<I>,
    pub source: CacheSource,
}

impl<I> QueryOutcome<I> {
    fn hit(image: I, source: CacheSource) -> Self {
        Self {
            image: Some(image),
            source,
        }
    }

    fn miss() -> Self {
        Self {
            image: None,
            source: CacheSource::None,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.image.is_some()
    }
}

// == Image Cache ==
/// Two-level image cache bound to one namespace directory.
///
/// Cloning yields another handle to the same cache. Must be created inside a
/// Tokio runtime; the disk lane runs on it.
pub struct ImageCache<C: ImageCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: ImageCodec> Clone for ImageCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C: ImageCodec> {
    codec: Arc<C>,
    memory: Arc<MemoryStore<C::Image>>,
    lane: IoLane<DiskStore>,
    /// Read by clean passes at run time; `namespace` is updated by moves
    config: Arc<RwLock<CacheConfig>>,
    stats: Arc<Mutex<CacheStats>>,
}

impl<C: ImageCodec> ImageCache<C> {
    // == Constructor ==
    /// Creates a cache for `config.namespace` under `config.cache_root`.
    ///
    /// Nothing is written to disk until the first disk store.
    pub fn new(codec: C, config: CacheConfig) -> Self {
        let disk = DiskStore::new(config.namespace_root());
        info!(
            root = %disk.root().display(),
            max_age_secs = config.max_age_secs,
            max_disk_bytes = config.max_disk_bytes,
            memory_cost_limit = ?config.memory_cost_limit,
            "Image cache initialized"
        );

        Self {
            inner: Arc::new(Inner {
                codec: Arc::new(codec),
                memory: Arc::new(MemoryStore::new(config.memory_cost_limit)),
                lane: IoLane::spawn(disk),
                config: Arc::new(RwLock::new(config)),
                stats: Arc::new(Mutex::new(CacheStats::new())),
            }),
        }
    }

    // == Store ==
    /// Stores `image` in memory and, if `to_disk`, on disk.
    ///
    /// `data` is written to disk as-is when given (typically the downloaded
    /// bytes); otherwise the image is encoded on the disk lane. The memory
    /// entry is visible immediately, the disk entry once the returned
    /// handle resolves. Empty images are ignored.
    pub fn store(
        &self,
        key: impl Into<String>,
        image: C::Image,
        data: Option<Vec<u8>>,
        to_disk: bool,
    ) -> Pending<()> {
        let key = key.into();
        let codec = &self.inner.codec;
        if codec.is_empty(&image) {
            debug!(key = %key, "Ignoring empty image");
            return Pending::ready(Ok(()));
        }

        let cost = codec.estimated_cost(&image);
        let evicted = self.inner.memory.set(key.clone(), image.clone(), cost);
        if evicted > 0 {
            self.inner.stats.lock().record_memory_evictions(evicted);
        }

        if !to_disk {
            return Pending::ready(Ok(()));
        }

        let codec = Arc::clone(codec);
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            let bytes = match data {
                Some(bytes) => bytes,
                None => codec
                    .encode(&image)
                    .map_err(|source| CacheError::Encode {
                        key: key.clone(),
                        source,
                    })?,
            };
            disk.write(&key, &bytes)
        })
    }

    /// Stores `image` in both tiers, encoding it for disk.
    pub fn store_image(&self, key: impl Into<String>, image: C::Image) -> Pending<()> {
        self.store(key, image, None, true)
    }

    // == Query ==
    /// Looks `key` up in memory, then on disk.
    ///
    /// A memory hit resolves immediately. Otherwise a disk read is queued; a
    /// decoded disk hit is put into memory before being returned. Missing
    /// files, unreadable files and undecodable bytes are all reported as a
    /// miss.
    pub fn query(&self, key: &str) -> Pending<QueryOutcome<C::Image>> {
        if let Some(image) = self.inner.memory.get(key) {
            self.inner.stats.lock().record_memory_hit();
            return Pending::ready(Ok(QueryOutcome::hit(image, CacheSource::Memory)));
        }

        let key = key.to_string();
        let codec = Arc::clone(&self.inner.codec);
        let memory = Arc::clone(&self.inner.memory);
        let stats = Arc::clone(&self.inner.stats);
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            Ok(load_from_disk(disk, &key, codec.as_ref(), &memory, &stats))
        })
    }

    /// Callback form of [`query`](Self::query).
    ///
    /// The callback runs on the caller's thread for a memory hit, otherwise
    /// on the disk lane. A lane failure is delivered as a miss.
    pub fn query_with<F>(&self, key: &str, callback: F)
    where
        F: FnOnce(QueryOutcome<C::Image>) + Send + 'static,
    {
        if let Some(image) = self.inner.memory.get(key) {
            self.inner.stats.lock().record_memory_hit();
            callback(QueryOutcome::hit(image, CacheSource::Memory));
            return;
        }

        let key = key.to_string();
        let codec = Arc::clone(&self.inner.codec);
        let memory = Arc::clone(&self.inner.memory);
        let stats = Arc::clone(&self.inner.stats);
        let pending = self.inner.lane.submit(move |disk: &mut DiskStore| {
            callback(load_from_disk(disk, &key, codec.as_ref(), &memory, &stats));
            Ok(())
        });
        drop(pending);
    }

    /// Memory-only lookup. Never touches disk.
    pub fn query_memory_only(&self, key: &str) -> Option<C::Image> {
        self.inner.memory.get(key)
    }

    // == Remove ==
    /// Removes `key` from memory now and, if `from_disk`, from disk once the
    /// returned handle resolves.
    ///
    /// Until the disk entry is gone, disk reads of `key` queued earlier are
    /// not cached in memory. A store issued after this call is kept.
    pub fn remove(&self, key: &str, from_disk: bool) -> Pending<()> {
        if !from_disk {
            self.inner.memory.remove(key);
            return Pending::ready(Ok(()));
        }

        let removal = self.inner.memory.begin_removal(&[key]);
        let key = key.to_string();
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            let _removal = removal;
            disk.remove(&key)
        })
    }

    // == Move Entry ==
    /// Moves the disk entry of `from_key` to `to_key`, replacing any entry
    /// there. Memory copies of both keys are dropped, as for
    /// [`remove`](Self::remove).
    pub fn move_entry(&self, from_key: &str, to_key: &str) -> Pending<()> {
        let removal = self.inner.memory.begin_removal(&[from_key, to_key]);
        let from_key = from_key.to_string();
        let to_key = to_key.to_string();
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            let _removal = removal;
            disk.move_entry(&from_key, &to_key)
        })
    }

    // == Clear ==
    /// Empties the memory tier. Disk is untouched.
    pub fn clear_memory(&self) {
        let cleared = self.inner.memory.clear();
        debug!(entries = cleared, "Cleared memory cache");
    }

    /// Low-memory hook for the host environment.
    pub fn handle_memory_pressure(&self) {
        let cleared = self.inner.memory.on_memory_pressure();
        info!(entries = cleared, "Memory pressure: dropped memory cache");
    }

    /// Deletes every disk entry of the namespace.
    pub fn clear_disk(&self) -> Pending<()> {
        self.inner.lane.submit(|disk: &mut DiskStore| disk.clear_all())
    }

    // == Clean ==
    /// Queues a clean pass using the limits configured when it runs.
    pub fn clean_disk(&self) -> Pending<CleanReport> {
        let config = Arc::clone(&self.inner.config);
        let stats = Arc::clone(&self.inner.stats);
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            let policy = CleanPolicy::from_config(&config.read());
            let report = clean::clean(disk, &policy, SystemTime::now())?;
            stats.lock().record_disk_evictions(report.removed());
            Ok(report)
        })
    }

    // == Accounting ==
    /// Total bytes stored on disk. Scans the namespace; O(entry count).
    pub fn disk_usage_bytes(&self) -> Pending<u64> {
        self.inner.lane.submit(|disk: &mut DiskStore| disk.usage_bytes())
    }

    /// Number of disk entries. Scans the namespace; O(entry count).
    pub fn disk_entry_count(&self) -> Pending<usize> {
        self.inner.lane.submit(|disk: &mut DiskStore| disk.file_count())
    }

    // == Move Namespace ==
    /// Moves every disk entry into `namespace` (the default namespace when
    /// None) and makes it the active namespace.
    ///
    /// The move is best effort: files that fail to move are listed in the
    /// report and stay behind, while the cache switches to the new namespace
    /// anyway. If the destination cannot be prepared nothing moves and the
    /// active namespace is unchanged. The memory tier is not affected.
    pub fn move_namespace(&self, namespace: Option<&str>) -> Pending<MoveReport> {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE).to_string();
        let config = Arc::clone(&self.inner.config);
        self.inner.lane.submit(move |disk: &mut DiskStore| {
            let to_root = namespace_root(&config.read().cache_root, &namespace);
            let report = DiskStore::move_namespace(disk.root(), &to_root)?;
            *disk = DiskStore::new(to_root);
            config.write().namespace = namespace;
            Ok(report)
        })
    }

    // == Flush ==
    /// Resolves once every disk task submitted before it has run.
    pub fn flush(&self) -> Pending<()> {
        self.inner.lane.submit(|_: &mut DiskStore| Ok(()))
    }

    // == Tuning ==
    /// Sets the maximum entry age for subsequent clean passes (0 disables).
    pub fn set_max_age_secs(&self, max_age_secs: u64) {
        self.inner.config.write().max_age_secs = max_age_secs;
    }

    /// Sets the disk budget for subsequent clean passes (0 = unlimited).
    pub fn set_max_disk_bytes(&self, max_disk_bytes: u64) {
        self.inner.config.write().max_disk_bytes = max_disk_bytes;
    }

    // == Introspection ==
    /// Active namespace. Changes when a queued namespace move completes.
    pub fn namespace(&self) -> String {
        self.inner.config.read().namespace.clone()
    }

    /// Directory of the active namespace.
    pub fn disk_root(&self) -> PathBuf {
        self.inner.config.read().namespace_root()
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> CacheConfig {
        self.inner.config.read().clone()
    }

    /// Hit, miss and eviction counters plus memory tier size.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.memory_entries = self.inner.memory.len();
        stats.memory_cost = self.inner.memory.total_cost();
        stats.memory_cost_limit = self.inner.memory.cost_limit();
        stats
    }
}

/// Disk half of a query; runs on the lane.
fn load_from_disk<C: ImageCodec>(
    disk: &DiskStore,
    key: &str,
    codec: &C,
    memory: &MemoryStore<C::Image>,
    stats: &Mutex<CacheStats>,
) -> QueryOutcome<C::Image> {
    // A store issued after the caller's memory miss wins over the disk copy.
    if let Some(image) = memory.get(key) {
        stats.lock().record_memory_hit();
        return QueryOutcome::hit(image, CacheSource::Memory);
    }

    let bytes = match disk.read(key) {
        Ok(bytes) => bytes,
        Err(e) => {
            if !e.is_not_found() {
                warn!(key = %key, error = %e, "Disk read failed; treating as miss");
            }
            stats.lock().record_miss();
            return QueryOutcome::miss();
        }
    };

    match codec.decode(&bytes) {
        Ok(image) => {
            let cost = codec.estimated_cost(&image);
            let evicted = memory
                .populate(key.to_string(), image.clone(), cost)
                .unwrap_or(0);
            let mut stats = stats.lock();
            stats.record_disk_hit();
            stats.record_memory_evictions(evicted);
            QueryOutcome::hit(image, CacheSource::Disk)
        }
        Err(source) => {
            let e = CacheError::Decode {
                key: key.to_string(),
                source,
            };
            warn!(error = %e, "Treating undecodable cache file as miss");
            stats.lock().record_miss();
            QueryOutcome::miss()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PassthroughCodec;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> ImageCache<PassthroughCodec> {
        ImageCache::new(
            PassthroughCodec,
            CacheConfig::with_root(dir.path(), "default"),
        )
    }

    fn image(bytes: &[u8]) -> Arc<Vec<u8>> {
        Arc::new(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_memory_hit_is_ready_immediately() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        drop(cache.store("k", image(b"abc"), None, false));

        let mut pending = tokio_test::task::spawn(cache.query("k"));
        let outcome = tokio_test::assert_ready!(pending.poll()).unwrap();

        assert_eq!(outcome.source, CacheSource::Memory);
        assert_eq!(outcome.image.unwrap().as_slice(), b"abc");
    }

    #[tokio::test]
    async fn test_store_without_disk_leaves_disk_empty() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.store("k", image(b"abc"), None, false).await.unwrap();

        assert_eq!(cache.disk_entry_count().await.unwrap(), 0);
        assert!(cache.query_memory_only("k").is_some());
    }

    #[tokio::test]
    async fn test_empty_image_is_ignored() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache.store_image("k", image(b"")).await.unwrap();

        assert!(cache.query_memory_only("k").is_none());
        assert_eq!(cache.disk_entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_prefers_supplied_bytes() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        cache
            .store("k", image(b"decoded"), Some(b"original".to_vec()), true)
            .await
            .unwrap();
        cache.clear_memory();

        let outcome = cache.query("k").await.unwrap();
        assert_eq!(outcome.source, CacheSource::Disk);
        assert_eq!(outcome.image.unwrap().as_slice(), b"original");
    }

    #[tokio::test]
    async fn test_remove_memory_only_keeps_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("k", image(b"abc")).await.unwrap();

        cache.remove("k", false).await.unwrap();

        assert!(cache.query_memory_only("k").is_none());
        assert_eq!(cache.query("k").await.unwrap().source, CacheSource::Disk);
    }

    #[tokio::test]
    async fn test_stats_track_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("k", image(b"abc")).await.unwrap();

        cache.query("k").await.unwrap();
        cache.clear_memory();
        cache.query("k").await.unwrap();
        cache.query("absent").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.memory_cost, 3);
    }

    #[tokio::test]
    async fn test_store_after_remove_survives_disk_removal() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("k", image(b"v1")).await.unwrap();

        let removed = cache.remove("k", true);
        drop(cache.store("k", image(b"v2"), None, false));
        removed.await.unwrap();
        cache.flush().await.unwrap();

        assert_eq!(cache.query_memory_only("k").unwrap().as_slice(), b"v2");
        assert_eq!(cache.disk_entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_after_move_entry_survives_move() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("from", image(b"moved")).await.unwrap();

        drop(cache.move_entry("from", "to"));
        drop(cache.store("from", image(b"fresh-from"), None, false));
        drop(cache.store("to", image(b"fresh-to"), None, false));
        cache.flush().await.unwrap();

        assert_eq!(cache.query_memory_only("from").unwrap().as_slice(), b"fresh-from");
        assert_eq!(cache.query_memory_only("to").unwrap().as_slice(), b"fresh-to");
    }

    #[tokio::test]
    async fn test_queued_read_does_not_restore_removed_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("k", image(b"abc")).await.unwrap();
        cache.clear_memory();

        let read = cache.query("k");
        let removed = cache.remove("k", true);

        // The read ran before the delete, so it still sees the file.
        assert_eq!(read.await.unwrap().source, CacheSource::Disk);
        removed.await.unwrap();
        assert!(cache.query_memory_only("k").is_none());
    }

    #[tokio::test]
    async fn test_stats_report_memory_limit() {
        let dir = TempDir::new().unwrap();
        let mut config = CacheConfig::with_root(dir.path(), "default");
        config.memory_cost_limit = Some(1024);
        let limited = ImageCache::new(PassthroughCodec, config);

        assert_eq!(limited.stats().memory_cost_limit, Some(1024));
        assert_eq!(cache_in(&dir).stats().memory_cost_limit, None);
    }

    #[tokio::test]
    async fn test_memory_pressure_keeps_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.store_image("k", image(b"abc")).await.unwrap();

        cache.handle_memory_pressure();

        assert!(cache.query_memory_only("k").is_none());
        assert_eq!(cache.disk_entry_count().await.unwrap(), 1);
    }
}
