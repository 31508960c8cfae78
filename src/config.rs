//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Prefix of every namespace directory under the cache root.
pub const NAMESPACE_DIR_PREFIX: &str = "image-cache.";

/// One week, in seconds.
pub const DEFAULT_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 7;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory that holds one sub-directory per namespace
    pub cache_root: PathBuf,
    /// Active namespace
    pub namespace: String,
    /// Maximum age of a disk entry in seconds, 0 = no expiry
    pub max_age_secs: u64,
    /// Disk size budget in bytes, 0 = unlimited
    pub max_disk_bytes: u64,
    /// Total cost the memory tier may hold, None = unbounded
    pub memory_cost_limit: Option<usize>,
    /// Interval of the periodic clean task in seconds
    pub clean_interval_secs: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `IMAGE_CACHE_ROOT` - Root directory (default: `<tmp>/image-cache`)
    /// - `IMAGE_CACHE_NAMESPACE` - Namespace (default: `default`)
    /// - `IMAGE_CACHE_MAX_AGE` - Max entry age in seconds (default: one week)
    /// - `IMAGE_CACHE_MAX_DISK_BYTES` - Disk budget in bytes (default: 0, unlimited)
    /// - `IMAGE_CACHE_MEMORY_LIMIT` - Memory cost limit (default: unset)
    /// - `IMAGE_CACHE_CLEAN_INTERVAL` - Clean task interval in seconds (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_root: env::var("IMAGE_CACHE_ROOT")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_root),
            namespace: env::var("IMAGE_CACHE_NAMESPACE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.namespace),
            max_age_secs: env::var("IMAGE_CACHE_MAX_AGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_age_secs),
            max_disk_bytes: env::var("IMAGE_CACHE_MAX_DISK_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_disk_bytes),
            memory_cost_limit: env::var("IMAGE_CACHE_MEMORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
            clean_interval_secs: env::var("IMAGE_CACHE_CLEAN_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.clean_interval_secs),
        }
    }

    /// Config rooted at `cache_root` with the given namespace, other fields default.
    pub fn with_root(cache_root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Directory of the active namespace.
    pub fn namespace_root(&self) -> PathBuf {
        namespace_root(&self.cache_root, &self.namespace)
    }

    /// Age threshold for the clean pass, None when expiry is disabled.
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
    }

    /// Disk budget for the clean pass, None when unlimited.
    pub fn disk_budget(&self) -> Option<u64> {
        (self.max_disk_bytes > 0).then_some(self.max_disk_bytes)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: env::temp_dir().join("image-cache"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            max_disk_bytes: 0,
            memory_cost_limit: None,
            clean_interval_secs: 3600,
        }
    }
}

/// Directory that stores the entries of `namespace` under `cache_root`.
pub fn namespace_root(cache_root: &Path, namespace: &str) -> PathBuf {
    cache_root.join(format!("{}{}", NAMESPACE_DIR_PREFIX, namespace))
}
