//! Disk Store Module
//!
//! Raw byte storage under one namespace directory. Every entry is a single
//! file named by [`cache_file_name`]; size and age come from the filesystem.
//!
//! A `DiskStore` is only ever touched from the disk lane.

use std::fs::{self, ReadDir};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{cache_file_name, DiskEntry};
use crate::error::{CacheError, Result};

/// Prefix of in-flight temporary files. Enumeration skips dot-files.
const TEMP_FILE_PREFIX: &str = ".tmp-";

// == Disk Store ==
/// Byte storage rooted at a namespace directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    // == Constructor ==
    /// Creates a store for `root`. Nothing is created on disk until the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path that holds (or would hold) the bytes for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(cache_file_name(key))
    }

    // == Write ==
    /// Writes `bytes` for `key`, atomically replacing any existing file.
    ///
    /// The bytes go to a temporary file in the same directory which is then
    /// renamed over the destination, so readers never see a partial file.
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| CacheError::io("create namespace directory", &self.root, e))?;

        let path = self.path_for(key);
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| CacheError::io("create temporary file", &self.root, e))?;
        temp.write_all(bytes)
            .map_err(|e| CacheError::io("write temporary file", temp.path(), e))?;
        temp.persist(&path)
            .map_err(|e| CacheError::io("atomic rename", &path, e.error))?;

        debug!(key = %key, path = %path.display(), bytes = bytes.len(), "Wrote cache file");
        Ok(())
    }

    // == Read ==
    /// Reads the bytes stored for `key`.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CacheError::NotFound(key.to_string())
            } else {
                CacheError::io("read cache file", &path, e)
            }
        })
    }

    // == Contains ==
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    // == Remove ==
    /// Deletes the file for `key`. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> Result<()> {
        remove_file_if_exists(&self.path_for(key))
    }

    // == Clear All ==
    /// Deletes the whole namespace directory and recreates it empty.
    pub fn clear_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io("remove namespace directory", &self.root, e)),
        }
        fs::create_dir_all(&self.root)
            .map_err(|e| CacheError::io("create namespace directory", &self.root, e))?;

        info!(root = %self.root.display(), "Cleared disk cache");
        Ok(())
    }

    // == Enumerate ==
    /// Lazily lists the cache files of the namespace, one directory level.
    ///
    /// A missing namespace directory yields an empty listing. Entries that
    /// cannot be inspected are skipped.
    pub fn enumerate(&self) -> Result<DiskEntries> {
        match fs::read_dir(&self.root) {
            Ok(dir) => Ok(DiskEntries { dir: Some(dir) }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DiskEntries { dir: None }),
            Err(e) => Err(CacheError::io("list namespace directory", &self.root, e)),
        }
    }

    // == Usage ==
    /// Total size of all cache files, in bytes. O(entry count).
    pub fn usage_bytes(&self) -> Result<u64> {
        Ok(self.enumerate()?.map(|entry| entry.size).sum())
    }

    /// Number of cache files. O(entry count).
    pub fn file_count(&self) -> Result<usize> {
        Ok(self.enumerate()?.count())
    }

    // == Move Entry ==
    /// Moves the file of `from_key` so that it becomes the entry of
    /// `to_key`, overwriting any existing entry.
    pub fn move_entry(&self, from_key: &str, to_key: &str) -> Result<()> {
        let source = self.path_for(from_key);
        let dest = self.path_for(to_key);
        if source == dest {
            return Ok(());
        }
        if !source.is_file() {
            return Err(CacheError::NotFound(from_key.to_string()));
        }
        relocate_file(&source, &dest).map_err(|e| CacheError::io("move cache file", &dest, e))
    }

    // == Move Namespace ==
    /// Moves every cache file from `from` into `to`, best effort.
    ///
    /// Files already present in `to` are overwritten on collision. A file
    /// that fails to move is logged and recorded in the report; the
    /// remaining files are still attempted and nothing is rolled back.
    /// Errors are returned only when the listing of `from` or the creation
    /// of `to` fails, in which case nothing has moved.
    pub fn move_namespace(from: &Path, to: &Path) -> Result<MoveReport> {
        let mut report = MoveReport::default();
        if from == to {
            return Ok(report);
        }

        let entries: Vec<DiskEntry> = DiskStore::new(from).enumerate()?.collect();
        fs::create_dir_all(to).map_err(|e| CacheError::io("create namespace directory", to, e))?;

        for entry in entries {
            let dest = to.join(&entry.file_name);
            match relocate_file(&entry.path, &dest) {
                Ok(()) => report.moved.push(entry.file_name),
                Err(e) => {
                    warn!(
                        file = %entry.file_name,
                        from = %from.display(),
                        to = %to.display(),
                        error = %e,
                        "Failed to move cache file"
                    );
                    report.failed.push(MoveFailure {
                        file_name: entry.file_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Leftover temporary files keep the directory alive.
        if report.failed.is_empty() {
            if let Err(e) = fs::remove_dir(from) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(
                        from = %from.display(),
                        error = %e,
                        "Old namespace directory left in place"
                    );
                }
            }
        }

        info!(
            from = %from.display(),
            to = %to.display(),
            moved = report.moved.len(),
            failed = report.failed.len(),
            "Moved disk cache namespace"
        );
        Ok(report)
    }
}

/// Deletes `path`, treating a missing file as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io("remove cache file", path, e)),
    }
}

/// Renames `source` onto `dest`, falling back to copy + delete when a
/// rename is impossible (for example across filesystems).
fn relocate_file(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                source = %source.display(),
                error = %rename_err,
                "Rename failed, copying instead"
            );
            fs::copy(source, dest)?;
            fs::remove_file(source)
        }
    }
}

// == Disk Entries ==
/// Lazy listing returned by [`DiskStore::enumerate`].
#[derive(Debug)]
pub struct DiskEntries {
    dir: Option<ReadDir>,
}

impl Iterator for DiskEntries {
    type Item = DiskEntry;

    fn next(&mut self) -> Option<DiskEntry> {
        let dir = self.dir.as_mut()?;
        for item in dir.by_ref() {
            match item {
                Ok(item) => {
                    if let Some(entry) = DiskEntry::from_dir_entry(&item) {
                        return Some(entry);
                    }
                }
                Err(e) => debug!(error = %e, "Skipping unreadable directory entry"),
            }
        }
        None
    }
}

// == Move Report ==
/// Outcome of a namespace move.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveReport {
    /// File names that now live in the destination
    pub moved: Vec<String>,
    /// Files left behind in the source
    pub failed: Vec<MoveFailure>,
}

impl MoveReport {
    /// True when every file was moved.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One file that could not be moved.
#[derive(Debug, Clone, Serialize)]
pub struct MoveFailure {
    pub file_name: String,
    pub error: String,
}
