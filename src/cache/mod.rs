//! Cache Module
//!
//! Two-level image cache: a cost-bounded memory tier of decoded images and a
//! disk tier of encoded bytes, with all disk work on one background lane.

pub mod clean;
mod disk;
mod engine;
mod entry;
mod key;
mod lane;
mod memory;
mod stats;


// Re-export public types
pub use clean::{CleanPolicy, CleanReport};
pub use disk::{DiskEntries, DiskStore, MoveFailure, MoveReport};
pub use engine::{CacheSource, ImageCache, QueryOutcome};
pub use entry::{DiskEntry, MemoryEntry};
pub use key::{cache_file_name, CACHE_FILE_NAME_LEN};
pub use lane::{IoLane, Pending};
pub use memory::{MemoryStore, RemovalGuard};
pub use stats::CacheStats;
