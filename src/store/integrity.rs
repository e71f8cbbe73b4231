//! Bounded, checksum-verified store for formatted messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          IntegrityCache                                 │
//! │                                                                         │
//! │   RwLock<CacheState>                                                    │
//! │   ┌───────────────────────────────────────────────────────────────┐     │
//! │   │ map:   FxHashMap<CacheKey, Arc<CacheEntry>>                   │     │
//! │   │ order: BTreeMap<sequence, CacheKey>   (oldest = first)        │     │
//! │   │ next_sequence: u64                                            │     │
//! │   └───────────────────────────────────────────────────────────────┘     │
//! │   CacheCounters (atomics)     AuditLog (optional, Mutex)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//!   get(K)  ── read guard ──► map[K]? ──► verify ──► hit
//!                                  │          └─ fail ─► strict: Corruption
//!                                  │                     lenient: drop read guard,
//!                                  │                              write guard, evict, miss
//!                                  └─ none ─► miss
//!
//!   put(K, text, errs)
//!      text.len() > max_entry_weight        ──► oversize skip
//!      errs.len() > max_errors_per_entry    ──► error-bloat skip
//!      ── write guard ──►
//!      existing == new                      ──► no-op
//!      existing != new && write_once        ──► WriteConflict (old kept)
//!      len == capacity                      ──► evict lowest sequence, insert
//! ```
//!
//! ## Invariants
//!
//! - `map` and `order` hold exactly the same keys, and `order[seq]` maps to
//!   the entry whose `sequence() == seq`.
//! - `map.len() <= capacity`.
//! - Sequence numbers are strictly increasing in insertion order.
//!
//! ## Example Usage
//!
//! ```
//! use ftlcache::args;
//! use ftlcache::key::normalize;
//! use ftlcache::store::IntegrityCache;
//!
//! let cache = IntegrityCache::new(100, 1024, 10, true, true, false);
//! let key = normalize("greeting", None, &args! { "name" => "Ana" }).unwrap();
//!
//! assert!(cache.get(&key).unwrap().is_none());
//! cache.put(key.clone(), "Hello, Ana!".into(), vec![]).unwrap();
//!
//! let entry = cache.get(&key).unwrap().unwrap();
//! assert_eq!(entry.formatted(), "Hello, Ana!");
//! assert!(entry.verify());
//! assert_eq!(cache.stats().hits, 1);
//! ```
//!
//! ## Thread Safety
//!
//! `IntegrityCache` is `Send + Sync`. Every map access happens under the
//! cache's [`RwLock`]; no method holds a guard across a call into another
//! public method, so the cache never nests acquisitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::builder::CacheConfig;
use crate::error::{CacheError, InvariantError, LockError};
use crate::key::CacheKey;
use crate::metrics::CacheStats;
use crate::metrics::counters::CacheCounters;
use crate::store::audit::{AuditEntry, AuditLog, AuditOp};
use crate::store::entry::{CacheEntry, ErrorRecord};
use crate::sync::{ReadGuard, RwLock, WriteGuard};

/// Result of [`IntegrityCache::get`]: `Ok(None)` is a miss.
pub type CacheResult = Result<Option<Arc<CacheEntry>>, CacheError>;

#[derive(Debug, Default)]
struct CacheState {
    map: FxHashMap<CacheKey, Arc<CacheEntry>>,
    order: BTreeMap<u64, CacheKey>,
    next_sequence: u64,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.map.remove(key)?;
        self.order.remove(&entry.sequence());
        Some(entry)
    }

    /// Removes `key` only if it still maps to the entry with `sequence`.
    fn remove_if_sequence(&mut self, key: &CacheKey, sequence: u64) -> bool {
        match self.map.get(key) {
            Some(entry) if entry.sequence() == sequence => {
                self.remove(key);
                true
            },
            _ => false,
        }
    }

    fn pop_oldest(&mut self) -> Option<(CacheKey, Arc<CacheEntry>)> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.map.remove(&key)?;
        Some((key, entry))
    }

    fn insert(&mut self, key: CacheKey, formatted: String, errors: Vec<ErrorRecord>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let entry = CacheEntry::new(formatted, errors, sequence);
        self.order.insert(sequence, key.clone());
        self.map.insert(key, Arc::new(entry));
        sequence
    }

    fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

/// Bounded key → [`CacheEntry`] store with integrity verification.
pub struct IntegrityCache {
    inner: RwLock<CacheState>,
    config: CacheConfig,
    counters: CacheCounters,
    size: AtomicUsize,
    audit: Option<Mutex<AuditLog>>,
}

impl IntegrityCache {
    /// Creates a cache with the given limits and policies.
    pub fn new(
        capacity: usize,
        max_entry_weight: usize,
        max_errors_per_entry: usize,
        write_once: bool,
        strict: bool,
        audit: bool,
    ) -> Self {
        Self::with_config(CacheConfig {
            capacity,
            max_entry_weight,
            max_errors_per_entry,
            write_once,
            strict,
            audit,
            ..CacheConfig::default()
        })
    }

    /// Creates a cache from a full configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        let audit = config
            .audit
            .then(|| Mutex::new(AuditLog::new(config.max_audit_entries)));
        Self {
            inner: RwLock::new(CacheState::default()),
            config,
            counters: CacheCounters::default(),
            size: AtomicUsize::new(0),
            audit,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`, verifying the entry's checksum on a hit.
    pub fn get(&self, key: &CacheKey) -> CacheResult {
        let corrupted_sequence = {
            let state = self.read_state()?;
            match state.map.get(key) {
                None => {
                    self.counters.inc_miss();
                    self.record(AuditOp::Miss, key, None);
                    return Ok(None);
                },
                Some(entry) if entry.verify() => {
                    self.counters.inc_hit();
                    self.record(AuditOp::Hit, key, Some(entry.sequence()));
                    return Ok(Some(Arc::clone(entry)));
                },
                Some(entry) => entry.sequence(),
            }
        };

        self.report_corruption(key, corrupted_sequence);
        if self.config.strict {
            return Err(CacheError::Corruption {
                message_id: key.message_id().to_owned(),
                sequence: corrupted_sequence,
            });
        }

        // Read guard is released above; eviction takes a fresh write guard.
        match self.write_state() {
            Ok(mut state) => {
                if state.remove_if_sequence(key, corrupted_sequence) {
                    self.size.store(state.map.len(), Ordering::Relaxed);
                    self.record(AuditOp::Evict, key, Some(corrupted_sequence));
                }
            },
            Err(err) => {
                tracing::warn!(
                    message_id = key.message_id(),
                    error = %err,
                    "could not evict corrupted cache entry"
                );
            },
        }
        self.counters.inc_miss();
        Ok(None)
    }

    /// Stores a formatted result.
    ///
    /// Oversize and error-bloated results are skipped (counted, not cached,
    /// not an error). With `write_once`, a differing value for an existing
    /// key is a [`CacheError::WriteConflict`] and the old entry is kept.
    pub fn put(
        &self,
        key: CacheKey,
        formatted: String,
        errors: Vec<ErrorRecord>,
    ) -> Result<(), CacheError> {
        if formatted.len() > self.config.max_entry_weight {
            self.counters.inc_oversize_skip();
            tracing::debug!(
                message_id = key.message_id(),
                weight = formatted.len(),
                limit = self.config.max_entry_weight,
                "skipping oversize cache entry"
            );
            return Ok(());
        }
        if errors.len() > self.config.max_errors_per_entry {
            self.counters.inc_error_bloat_skip();
            tracing::debug!(
                message_id = key.message_id(),
                errors = errors.len(),
                limit = self.config.max_errors_per_entry,
                "skipping cache entry with too many errors"
            );
            return Ok(());
        }
        if self.config.capacity == 0 {
            return Ok(());
        }

        let mut state = self.write_state()?;

        let existing = state.map.get(&key).map(Arc::clone);
        if let Some(existing) = existing {
            if !existing.verify() {
                self.report_corruption(&key, existing.sequence());
                if self.config.strict {
                    return Err(CacheError::Corruption {
                        message_id: key.message_id().to_owned(),
                        sequence: existing.sequence(),
                    });
                }
                state.remove(&key);
                self.record(AuditOp::Evict, &key, Some(existing.sequence()));
            } else if existing.same_payload(&formatted, &errors) {
                self.counters.inc_idempotent_write();
                return Ok(());
            } else if self.config.write_once {
                self.counters.inc_write_conflict();
                self.record(AuditOp::Conflict, &key, Some(existing.sequence()));
                tracing::warn!(
                    message_id = key.message_id(),
                    attribute = key.attribute(),
                    sequence = existing.sequence(),
                    "write-once conflict: formatting is not deterministic"
                );
                return Err(CacheError::WriteConflict {
                    message_id: key.message_id().to_owned(),
                });
            } else {
                state.remove(&key);
            }
        }

        while state.map.len() >= self.config.capacity {
            let Some((evicted_key, evicted)) = state.pop_oldest() else {
                break;
            };
            self.counters.inc_eviction();
            self.record(AuditOp::Evict, &evicted_key, Some(evicted.sequence()));
            tracing::debug!(
                message_id = evicted_key.message_id(),
                sequence = evicted.sequence(),
                "evicted oldest cache entry"
            );
        }

        let fingerprint = key.fingerprint();
        let sequence = state.insert(key, formatted, errors);
        self.size.store(state.map.len(), Ordering::Relaxed);
        drop(state);

        self.counters.inc_put();
        self.record_fingerprint(AuditOp::Put, fingerprint, Some(sequence));
        Ok(())
    }

    /// Drops all entries. Counters are cumulative and are not reset.
    pub fn clear(&self) {
        // The cache never nests guards, so an untimed acquisition cannot
        // report misuse or time out.
        match self.inner.write(None) {
            Ok(mut state) => {
                let dropped = state.map.len();
                state.clear();
                self.size.store(0, Ordering::Relaxed);
                drop(state);
                self.record_fingerprint(AuditOp::Clear, 0, None);
                tracing::debug!(dropped, "cleared format cache");
            },
            Err(err) => tracing::error!(error = %err, "failed to clear format cache"),
        }
    }

    /// Returns `true` if `key` is stored, without verifying or counting.
    pub fn contains(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.read_state()?.map.contains_key(key))
    }

    /// Snapshot of counters and gauges.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len(), self.config.capacity)
    }

    /// Counts a format request that bypassed the cache because its
    /// arguments could not be normalized.
    pub fn note_unhashable_skip(&self) {
        self.counters.inc_unhashable_skip();
    }

    /// Copy of the audit trail, oldest first. Empty when auditing is off.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit
            .as_ref()
            .map(|log| log.lock().to_vec())
            .unwrap_or_default()
    }

    /// Validates internal bookkeeping.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let state = self
            .inner
            .read(None)
            .map_err(|err| InvariantError::new(format!("cannot inspect cache: {err}")))?;
        if state.map.len() != state.order.len() {
            return Err(InvariantError::new(format!(
                "map holds {} entries but sequence index holds {}",
                state.map.len(),
                state.order.len()
            )));
        }
        if state.map.len() > self.config.capacity {
            return Err(InvariantError::new(format!(
                "cache holds {} entries, capacity is {}",
                state.map.len(),
                self.config.capacity
            )));
        }
        for (&sequence, key) in &state.order {
            match state.map.get(key) {
                Some(entry) if entry.sequence() == sequence => {},
                Some(entry) => {
                    return Err(InvariantError::new(format!(
                        "sequence index has {sequence} for '{}' but entry has {}",
                        key.message_id(),
                        entry.sequence()
                    )));
                },
                None => {
                    return Err(InvariantError::new(format!(
                        "sequence {sequence} points at missing key '{}'",
                        key.message_id()
                    )));
                },
            }
            if sequence >= state.next_sequence {
                return Err(InvariantError::new(format!(
                    "sequence {sequence} not below next sequence {}",
                    state.next_sequence
                )));
            }
        }
        Ok(())
    }

    fn read_state(&self) -> Result<ReadGuard<'_, CacheState>, CacheError> {
        self.inner
            .read(self.config.lock_timeout)
            .map_err(|err| self.lock_failed(err))
    }

    fn write_state(&self) -> Result<WriteGuard<'_, CacheState>, CacheError> {
        self.inner
            .write(self.config.lock_timeout)
            .map_err(|err| self.lock_failed(err))
    }

    fn lock_failed(&self, err: LockError) -> CacheError {
        if err.is_timeout() {
            self.counters.inc_lock_timeout();
            tracing::warn!(error = %err, "format cache lock timed out");
        }
        CacheError::Lock(err)
    }

    fn report_corruption(&self, key: &CacheKey, sequence: u64) {
        self.counters.inc_corruption();
        self.record(AuditOp::Corruption, key, Some(sequence));
        tracing::warn!(
            message_id = key.message_id(),
            attribute = key.attribute(),
            sequence,
            strict = self.config.strict,
            "cache entry failed checksum verification"
        );
    }

    #[inline]
    fn record(&self, op: AuditOp, key: &CacheKey, sequence: Option<u64>) {
        if self.audit.is_some() {
            self.record_fingerprint(op, key.fingerprint(), sequence);
        }
    }

    fn record_fingerprint(&self, op: AuditOp, fingerprint: u64, sequence: Option<u64>) {
        if let Some(log) = &self.audit {
            log.lock().record(op, fingerprint, sequence);
        }
    }

    /// Swaps the stored entry for `key` with one whose payload no longer
    /// matches its checksum, keeping the sequence number.
    #[cfg(test)]
    fn corrupt_entry(&self, key: &CacheKey, formatted: &str) {
        let mut state = self.inner.write(None).unwrap();
        let original = Arc::clone(state.map.get(key).expect("entry to corrupt"));
        let tampered = CacheEntry::with_checksum(
            formatted,
            original.errors().to_vec(),
            original.sequence(),
            original.checksum(),
        );
        state.map.insert(key.clone(), Arc::new(tampered));
    }
}

impl fmt::Debug for IntegrityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
