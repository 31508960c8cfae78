//! Error types for the image cache
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::CodecError;

// == Cache Error Enum ==
/// Unified error type for the image cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure (permission, disk full, device error)
    #[error("I/O error during {operation} on {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key has no entry on disk
    #[error("Key not found on disk: {0}")]
    NotFound(String),

    /// Cached bytes could not be decoded
    #[error("Failed to decode cached image for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Image could not be encoded for disk storage
    #[error("Failed to encode image for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Rejected input
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The background disk lane is gone or dropped the task
    #[error("Disk lane unavailable: {0}")]
    LaneUnavailable(String),
}

impl CacheError {
    /// Wraps an I/O error with the operation and path it happened on.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        CacheError::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True when the error only means "no such entry".
    pub fn is_not_found(&self) -> bool {
        match self {
            CacheError::NotFound(_) => true,
            CacheError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the image cache.
pub type Result<T> = std::result::Result<T, CacheError>;
