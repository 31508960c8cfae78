//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Disk clean: Runs age and size eviction at configured intervals

mod cleanup;

pub use cleanup::spawn_clean_task;
