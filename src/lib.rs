//! Image Cache - A two-level cache for decoded images
//!
//! Keeps decoded images in a cost-bounded memory tier and their encoded
//! bytes in a per-namespace disk directory. Disk writes, reads and cleanup
//! run on a background lane so callers are never blocked by storage.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{
    CacheSource, CacheStats, CleanReport, ImageCache, MoveReport, Pending, QueryOutcome,
};
pub use codec::{CodecError, ImageCodec, PassthroughCodec};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_clean_task;
