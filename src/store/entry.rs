//! Immutable cache entries and their integrity checksum.
//!
//! A [`CacheEntry`] holds the formatted text and the resolver's error list,
//! plus a checksum over both. Entries are never mutated after construction;
//! the cache shares them as `Arc<CacheEntry>`.
//!
//! ## Checksum
//!
//! ```text
//!   blake3(  "F" len:be64 formatted
//!            "E" count:be64
//!            for each error: code len:be64 message )  ──► first 16 bytes ──► u128
//! ```
//!
//! Errors contribute their stable representation (category code and
//! message), so two error lists that render identically checksum
//! identically.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Broad classification of a formatting diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    /// Unknown message, term, attribute or variable.
    Reference,
    /// Resolution failed (bad selector, missing default variant, ...).
    Resolution,
    /// Cyclic reference between messages or terms.
    Cyclic,
    /// A function or number/date formatter failed.
    Formatting,
    Parse,
}

impl ErrorCategory {
    /// Stable code used for checksums and display.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Reference => "reference",
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Cyclic => "cyclic",
            ErrorCategory::Formatting => "formatting",
            ErrorCategory::Parse => "parse",
        }
    }
}

/// One non-fatal diagnostic produced while formatting a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category.code(), self.message)
    }
}

/// Computes the integrity checksum over `formatted` and `errors`.
pub fn checksum(formatted: &str, errors: &[ErrorRecord]) -> u128 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"F");
    hasher.update(&(formatted.len() as u64).to_be_bytes());
    hasher.update(formatted.as_bytes());
    hasher.update(b"E");
    hasher.update(&(errors.len() as u64).to_be_bytes());
    for error in errors {
        let code = error.category.code();
        hasher.update(&(code.len() as u64).to_be_bytes());
        hasher.update(code.as_bytes());
        hasher.update(&(error.message.len() as u64).to_be_bytes());
        hasher.update(error.message.as_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest.as_bytes()[..16]);
    u128::from_be_bytes(head)
}

/// Immutable formatted result with checksum and insertion metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    formatted: Arc<str>,
    errors: Arc<[ErrorRecord]>,
    checksum: u128,
    created_at: Instant,
    sequence: u64,
}

impl CacheEntry {
    /// Builds an entry and computes its checksum.
    pub fn new(formatted: impl Into<Arc<str>>, errors: Vec<ErrorRecord>, sequence: u64) -> Self {
        let formatted = formatted.into();
        let checksum = checksum(&formatted, &errors);
        Self {
            formatted,
            errors: errors.into(),
            checksum,
            created_at: Instant::now(),
            sequence,
        }
    }

    /// Builds an entry with a caller-supplied checksum. Used to model stored
    /// data that no longer matches its digest.
    #[cfg(test)]
    pub(crate) fn with_checksum(
        formatted: impl Into<Arc<str>>,
        errors: Vec<ErrorRecord>,
        sequence: u64,
        checksum: u128,
    ) -> Self {
        Self {
            formatted: formatted.into(),
            errors: errors.into(),
            checksum,
            created_at: Instant::now(),
            sequence,
        }
    }

    pub fn formatted(&self) -> &str {
        &self.formatted
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn checksum(&self) -> u128 {
        self.checksum
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Size of the formatted text in bytes.
    pub fn weight(&self) -> usize {
        self.formatted.len()
    }

    /// Recomputes the checksum and compares it with the stored one.
    pub fn verify(&self) -> bool {
        checksum(&self.formatted, &self.errors) == self.checksum
    }

    /// Returns `true` if `formatted` and `errors` equal this entry's payload.
    pub fn same_payload(&self, formatted: &str, errors: &[ErrorRecord]) -> bool {
        *self.formatted == *formatted && *self.errors == *errors
    }

    /// Clones the payload out of the entry.
    pub fn to_parts(&self) -> (String, Vec<ErrorRecord>) {
        (self.formatted.to_string(), self.errors.to_vec())
    }
}
