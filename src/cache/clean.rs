//! Disk Clean Module
//!
//! Age and size based eviction of disk entries.
//!
//! A clean pass runs in two phases:
//! 1. every entry older than the maximum age is deleted (skipped when no
//!    maximum age is configured);
//! 2. if the surviving entries still exceed the disk budget, they are deleted
//!    oldest first (by mtime, ties by file name) until usage fits the budget.

use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::disk::remove_file_if_exists;
use crate::cache::{DiskEntry, DiskStore};
use crate::config::CacheConfig;
use crate::error::Result;

// == Clean Policy ==
/// Limits applied by one clean pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanPolicy {
    /// Entries older than this are deleted, None = no expiry
    pub max_age: Option<std::time::Duration>,
    /// Usage ceiling in bytes, None = unlimited
    pub max_bytes: Option<u64>,
}

impl CleanPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_age: config.max_age(),
            max_bytes: config.disk_budget(),
        }
    }
}

// == Clean Report ==
/// Result of a clean pass.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    /// Files deleted for exceeding the maximum age
    pub expired_removed: usize,
    /// Files deleted to get under the disk budget
    pub evicted_removed: usize,
    /// Bytes released by both phases
    pub bytes_freed: u64,
    /// Files that could not be deleted
    pub delete_failures: usize,
    /// Usage after the pass
    pub remaining_bytes: u64,
    /// File count after the pass
    pub remaining_files: usize,
    /// Duration of the pass in milliseconds
    pub duration_ms: u64,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

impl CleanReport {
    /// Total files removed by the pass.
    pub fn removed(&self) -> usize {
        self.expired_removed + self.evicted_removed
    }
}

// == Clean ==
/// Runs one clean pass over `disk` as of `now`.
pub fn clean(disk: &DiskStore, policy: &CleanPolicy, now: SystemTime) -> Result<CleanReport> {
    let start = Instant::now();
    let entries: Vec<DiskEntry> = disk.enumerate()?.collect();

    let mut bytes_freed = 0u64;
    let mut delete_failures = 0usize;

    // 1. Age-based deletion
    let mut expired_removed = 0usize;
    let mut survivors = Vec::with_capacity(entries.len());
    for entry in entries {
        let expired = policy
            .max_age
            .is_some_and(|max_age| entry.is_expired(max_age, now));
        if !expired {
            survivors.push(entry);
            continue;
        }
        match remove_file_if_exists(&entry.path) {
            Ok(()) => {
                expired_removed += 1;
                bytes_freed += entry.size;
            }
            Err(e) => {
                delete_failures += 1;
                warn!(path = %entry.path.display(), error = %e, "Failed to delete expired cache file");
                survivors.push(entry);
            }
        }
    }

    // 2. Size-based deletion, oldest first
    let mut remaining_bytes: u64 = survivors.iter().map(|entry| entry.size).sum();
    let mut remaining_files = survivors.len();
    let mut evicted_removed = 0usize;
    if let Some(budget) = policy.max_bytes {
        if remaining_bytes > budget {
            debug!(usage = remaining_bytes, budget, "Disk cache over budget");
            for entry in plan_size_eviction(survivors, budget) {
                match remove_file_if_exists(&entry.path) {
                    Ok(()) => {
                        evicted_removed += 1;
                        bytes_freed += entry.size;
                        remaining_bytes -= entry.size;
                        remaining_files -= 1;
                    }
                    Err(e) => {
                        delete_failures += 1;
                        warn!(path = %entry.path.display(), error = %e, "Failed to evict cache file");
                    }
                }
            }
        }
    }

    let report = CleanReport {
        expired_removed,
        evicted_removed,
        bytes_freed,
        delete_failures,
        remaining_bytes,
        remaining_files,
        duration_ms: start.elapsed().as_millis() as u64,
        completed_at: Utc::now(),
    };
    info!(
        root = %disk.root().display(),
        expired = report.expired_removed,
        evicted = report.evicted_removed,
        bytes_freed = report.bytes_freed,
        remaining_bytes = report.remaining_bytes,
        "Disk cache clean complete"
    );
    Ok(report)
}

// == Size Eviction Plan ==
/// Chooses which entries to delete so the rest fit in `budget` bytes.
///
/// Entries are taken strictly oldest first (mtime, then file name) until the
/// remaining usage is at or below the budget.
pub fn plan_size_eviction(mut entries: Vec<DiskEntry>, budget: u64) -> Vec<DiskEntry> {
    let mut usage: u64 = entries.iter().map(|entry| entry.size).sum();
    entries.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    entries
        .into_iter()
        .take_while(|entry| {
            if usage <= budget {
                return false;
            }
            usage -= entry.size;
            true
        })
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes `size` bytes for `key` and backdates its mtime by `age_secs`.
    fn write_aged(disk: &DiskStore, key: &str, size: usize, age_secs: u64, now: SystemTime) -> PathBuf {
        disk.write(key, &vec![7u8; size]).unwrap();
        let path = disk.path_for(key);
        set_mtime(&path, now - Duration::from_secs(age_secs));
        path
    }

    fn set_mtime(path: &Path, mtime: SystemTime) {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime)).unwrap();
    }

    fn policy(max_age_secs: u64, max_bytes: u64) -> CleanPolicy {
        let mut config = CacheConfig::default();
        config.max_age_secs = max_age_secs;
        config.max_disk_bytes = max_bytes;
        CleanPolicy::from_config(&config)
    }

    #[test]
    fn test_age_eviction_boundary() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path());
        let now = SystemTime::now();
        let max_age = 100;
        let stale = write_aged(&disk, "stale", 10, max_age + 1, now);
        let fresh = write_aged(&disk, "fresh", 10, max_age - 1, now);

        let report = clean(&disk, &policy(max_age, 0), now).unwrap();

        assert_eq!(report.expired_removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert_eq!(report.remaining_files, 1);
    }

    #[test]
    fn test_zero_max_age_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path());
        let now = SystemTime::now();
        write_aged(&disk, "ancient", 10, 10 * 365 * 24 * 3600, now);

        let report = clean(&disk, &policy(0, 0), now).unwrap();

        assert_eq!(report.removed(), 0);
        assert_eq!(disk.file_count().unwrap(), 1);
    }

    #[test]
    fn test_size_eviction_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path());
        let now = SystemTime::now();
        let t1 = write_aged(&disk, "t1", 100, 300, now);
        let t2 = write_aged(&disk, "t2", 100, 200, now);
        let t3 = write_aged(&disk, "t3", 100, 100, now);

        let report = clean(&disk, &policy(0, 150), now).unwrap();

        assert_eq!(report.evicted_removed, 2);
        assert_eq!(report.bytes_freed, 200);
        assert_eq!(report.remaining_bytes, 100);
        assert!(!t1.exists());
        assert!(!t2.exists());
        assert!(t3.exists());
    }

    #[test]
    fn test_age_phase_runs_before_size_phase() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path());
        let now = SystemTime::now();
        write_aged(&disk, "expired", 100, 5000, now);
        let older = write_aged(&disk, "older", 100, 500, now);
        let newer = write_aged(&disk, "newer", 100, 50, now);

        let report = clean(&disk, &policy(1000, 100), now).unwrap();

        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.evicted_removed, 1);
        assert!(!older.exists());
        assert!(newer.exists());
    }

    #[test]
    fn test_under_budget_removes_nothing() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path());
        let now = SystemTime::now();
        write_aged(&disk, "a", 100, 10, now);

        let report = clean(&disk, &policy(0, 100), now).unwrap();

        assert_eq!(report.removed(), 0);
        assert_eq!(report.remaining_bytes, 100);
    }

    #[test]
    fn test_clean_missing_root() {
        let dir = TempDir::new().unwrap();
        let disk = DiskStore::new(dir.path().join("never-written"));

        let report = clean(&disk, &policy(10, 10), SystemTime::now()).unwrap();

        assert_eq!(report.removed(), 0);
        assert_eq!(report.remaining_files, 0);
    }

    #[test]
    fn test_plan_breaks_mtime_ties_by_name() {
        let mtime = SystemTime::now();
        let entry = |name: &str| DiskEntry {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            size: 10,
            modified: mtime,
        };

        let plan = plan_size_eviction(vec![entry("c"), entry("a"), entry("b")], 10);

        let names: Vec<&str> = plan.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
