//! Error types for the ftlcache library.
//!
//! ## Key Components
//!
//! - [`LockError`]: Returned by [`RwLock`](crate::sync::RwLock) acquisition and
//!   release (misuse, timeout, invalid timeout argument).
//! - [`CacheError`]: Returned by [`IntegrityCache`](crate::store::IntegrityCache)
//!   reads and writes (corruption, write conflict, lock failure).
//! - [`NormalizeError`]: Returned when an argument bag cannot be turned into a
//!   [`CacheKey`](crate::key::CacheKey).
//! - [`FormatError`]: Returned by [`CachedFormatter`](crate::bundle::CachedFormatter).
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid.
//! - [`InvariantError`]: Returned by `check_invariants` when internal
//!   bookkeeping disagrees with itself.
//!
//! ## Example Usage
//!
//! ```
//! use ftlcache::builder::CacheBuilder;
//! use ftlcache::error::ConfigError;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache = CacheBuilder::new(100).max_entry_weight(1024).try_build();
//! assert!(cache.is_ok());
//!
//! // Invalid weight limit is caught without panicking
//! let bad: Result<_, ConfigError> = CacheBuilder::new(100).max_entry_weight(0).try_build();
//! assert!(bad.is_err());
//! ```

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`IntegrityCache::check_invariants`](crate::store::IntegrityCache::check_invariants).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::try_build`](crate::builder::CacheBuilder::try_build)
/// and [`CacheConfig::validate`](crate::builder::CacheConfig::validate).
///
/// # Example
///
/// ```
/// use ftlcache::builder::CacheBuilder;
///
/// let err = CacheBuilder::new(8).max_entry_weight(0).try_build().unwrap_err();
/// assert!(err.to_string().contains("max_entry_weight"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

/// Which side of the lock an operation concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Read => f.write_str("read"),
            LockMode::Write => f.write_str("write"),
        }
    }
}

/// Contract violations detected by the lock. All nesting must be flat apart
/// from reentrant reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockMisuse {
    #[error("thread already holds the write lock; reentrant writes are not allowed")]
    ReentrantWrite,
    #[error("thread holds a read lock; upgrading to write is not allowed")]
    Upgrade,
    #[error("thread holds the write lock; downgrading to read is not allowed")]
    Downgrade,
    #[error("thread released a {0} lock it does not hold")]
    ReleaseNotHeld(LockMode),
}

/// Failures reported by [`RwLock`](crate::sync::RwLock).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LockError {
    /// Programmer error; never retried.
    #[error("lock misuse: {0}")]
    Misuse(#[from] LockMisuse),
    /// The lock was not available within the requested timeout.
    #[error("timed out after {waited:?} waiting for {mode} lock")]
    Timeout { mode: LockMode, waited: Duration },
    /// The supplied timeout was negative or NaN.
    #[error("invalid lock timeout: {0} seconds")]
    InvalidTimeout(f64),
}

impl LockError {
    /// Returns `true` for [`LockError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }

    /// Returns `true` for [`LockError::Misuse`].
    pub fn is_misuse(&self) -> bool {
        matches!(self, LockError::Misuse(_))
    }
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Failures reported by [`IntegrityCache`](crate::store::IntegrityCache).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// A stored entry failed checksum verification (strict mode only).
    #[error("cache entry for message '{message_id}' (sequence {sequence}) failed checksum verification")]
    Corruption { message_id: String, sequence: u64 },
    /// Write-once cache received a different value for an existing key.
    #[error("write conflict for message '{message_id}': cached value differs from new value")]
    WriteConflict { message_id: String },
    #[error(transparent)]
    Lock(#[from] LockError),
}

// ---------------------------------------------------------------------------
// NormalizeError
// ---------------------------------------------------------------------------

/// Failures turning an argument bag into a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("argument '{arg}' cannot be made hashable")]
    Unhashable { arg: String },
    #[error("argument '{arg}' nests deeper than {limit} levels")]
    TooDeep { arg: String, limit: usize },
}

// ---------------------------------------------------------------------------
// ResolutionError / FormatError
// ---------------------------------------------------------------------------

/// Hard failure reported by a [`Resolver`](crate::bundle::Resolver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to resolve '{message_id}': {reason}")]
pub struct ResolutionError {
    pub message_id: String,
    pub reason: String,
}

impl ResolutionError {
    pub fn new(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by [`CachedFormatter::format`](crate::bundle::CachedFormatter::format).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
