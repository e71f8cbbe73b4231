use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::CacheStats;

/// Counter block for [`IntegrityCache`](crate::store::IntegrityCache).
///
/// Atomics so that `get` can count hits and misses while holding only a
/// read guard.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    oversize_skips: AtomicU64,
    error_bloat_skips: AtomicU64,
    puts: AtomicU64,
    idempotent_writes: AtomicU64,
    write_conflicts: AtomicU64,
    evictions: AtomicU64,
    corruption_detected: AtomicU64,
    unhashable_skips: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl CacheCounters {
    /// Snapshot current counters; gauges are filled in by the caller.
    pub(crate) fn snapshot(&self, size: usize, capacity: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            oversize_skips: self.oversize_skips.load(Ordering::Relaxed),
            error_bloat_skips: self.error_bloat_skips.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            idempotent_writes: self.idempotent_writes.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            corruption_detected: self.corruption_detected.load(Ordering::Relaxed),
            unhashable_skips: self.unhashable_skips.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            size,
            capacity,
        }
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_oversize_skip(&self) {
        self.oversize_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_error_bloat_skip(&self) {
        self.error_bloat_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_idempotent_write(&self) {
        self.idempotent_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_corruption(&self) {
        self.corruption_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_unhashable_skip(&self) {
        self.unhashable_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}
