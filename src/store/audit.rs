//! Bounded audit trail of cache operations.
//!
//! Enabled with `audit = true`. The log keeps the most recent
//! `max_entries` records; older records are dropped first.

use std::collections::VecDeque;
use std::time::Instant;

/// Operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOp {
    Hit,
    Miss,
    Put,
    Evict,
    Corruption,
    Conflict,
    Clear,
}

/// One audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditEntry {
    pub op: AuditOp,
    /// [`CacheKey::fingerprint`](crate::key::CacheKey::fingerprint); `0` for
    /// operations that do not concern a single key.
    pub key_fingerprint: u64,
    /// Sequence number of the entry involved, if any.
    pub sequence: Option<u64>,
    pub at: Instant,
}

#[derive(Debug)]
pub(crate) struct AuditLog {
    entries: VecDeque<AuditEntry>,
    max_entries: usize,
}

impl AuditLog {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
        }
    }

    pub(crate) fn record(&mut self, op: AuditOp, key_fingerprint: u64, sequence: Option<u64>) {
        if self.max_entries == 0 {
            return;
        }
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(AuditEntry {
            op,
            key_fingerprint,
            sequence,
            at: Instant::now(),
        });
    }

    pub(crate) fn to_vec(&self) -> Vec<AuditEntry> {
        self.entries.iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_drops_oldest_when_full() {
        let mut log = AuditLog::new(2);
        log.record(AuditOp::Put, 1, Some(1));
        log.record(AuditOp::Hit, 1, Some(1));
        log.record(AuditOp::Evict, 1, Some(1));

        let ops: Vec<_> = log.to_vec().into_iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![AuditOp::Hit, AuditOp::Evict]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn audit_log_zero_capacity_is_noop() {
        let mut log = AuditLog::new(0);
        log.record(AuditOp::Clear, 0, None);
        assert_eq!(log.len(), 0);
    }
}
