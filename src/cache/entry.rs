//! Cache Entry Module
//!
//! Defines the memory-tier entry and the metadata of a disk-tier entry.

use std::fs::DirEntry;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tracing::debug;

// == Memory Entry ==
/// A decoded image held by the memory tier.
#[derive(Debug, Clone)]
pub struct MemoryEntry<V> {
    /// The decoded image
    pub value: V,
    /// Cost charged against the memory limit
    pub cost: usize,
}

impl<V> MemoryEntry<V> {
    pub fn new(value: V, cost: usize) -> Self {
        Self { value, cost }
    }
}

// == Disk Entry ==
/// Metadata of one cache file, read from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    /// Full path of the file
    pub path: PathBuf,
    /// File name (the hashed key)
    pub file_name: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl DiskEntry {
    /// Builds an entry from a directory listing item.
    ///
    /// Returns None for anything that is not a regular cache file: hidden or
    /// temporary files, sub-directories, non UTF-8 names, or files whose
    /// metadata cannot be read.
    pub fn from_dir_entry(entry: &DirEntry) -> Option<Self> {
        let file_name = entry.file_name().into_string().ok()?;
        if file_name.starts_with('.') {
            return None;
        }

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable cache file");
                return None;
            }
        };
        if !metadata.is_file() {
            return None;
        }
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping cache file without mtime");
                return None;
            }
        };

        Some(Self {
            path,
            file_name,
            size: metadata.len(),
            modified,
        })
    }

    // == Age ==
    /// Time elapsed since the last write, zero for mtimes in the future.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or(Duration::ZERO)
    }

    // == Is Expired ==
    /// Checks if the entry is older than `max_age`.
    ///
    /// An entry exactly `max_age` old is still fresh.
    pub fn is_expired(&self, max_age: Duration, now: SystemTime) -> bool {
        self.age(now) > max_age
    }
}
