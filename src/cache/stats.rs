//! Cache Statistics Module
//!
//! Tracks cache performance metrics including tier hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Queries answered by the memory tier
    pub memory_hits: u64,
    /// Queries answered by the disk tier
    pub disk_hits: u64,
    /// Queries answered by neither tier
    pub misses: u64,
    /// Memory entries dropped to stay under the cost limit
    pub memory_evictions: u64,
    /// Disk files removed by clean passes
    pub disk_evictions: u64,
    /// Current number of memory entries
    pub memory_entries: usize,
    /// Current total cost of the memory tier
    pub memory_cost: usize,
    /// Cost limit of the memory tier, None when unbounded
    pub memory_cost_limit: Option<usize>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate across both tiers.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no queries have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_memory_evictions(&mut self, count: usize) {
        self.memory_evictions += count as u64;
    }

    pub fn record_disk_evictions(&mut self, count: usize) {
        self.disk_evictions += count as u64;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.disk_hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.memory_evictions, 0);
        assert_eq!(stats.disk_evictions, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_both_tiers() {
        let mut stats = CacheStats::new();
        stats.record_memory_hit();
        stats.record_disk_hit();
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_record_evictions() {
        let mut stats = CacheStats::new();
        stats.record_memory_evictions(2);
        stats.record_disk_evictions(3);
        stats.record_disk_evictions(1);
        assert_eq!(stats.memory_evictions, 2);
        assert_eq!(stats.disk_evictions, 4);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.record_disk_hit();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["disk_hits"], 1);
        assert_eq!(json["memory_entries"], 0);
    }
}
