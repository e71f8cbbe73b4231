/// Point-in-time view of an [`IntegrityCache`](crate::store::IntegrityCache)'s
/// counters.
///
/// Counters are cumulative for the cache's lifetime; `clear()` does not
/// reset them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub oversize_skips: u64,
    pub error_bloat_skips: u64,

    pub puts: u64,
    pub idempotent_writes: u64,
    pub write_conflicts: u64,
    pub evictions: u64,
    pub corruption_detected: u64,
    pub unhashable_skips: u64,
    pub lock_timeouts: u64,

    // gauges captured at snapshot time
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Total `get` calls that completed with a hit or a miss.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit ratio in `[0.0, 1.0]`; `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
