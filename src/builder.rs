//! Cache configuration and fluent builder.
//!
//! [`CacheConfig`] is a plain value with documented defaults;
//! [`CacheBuilder`] is the fluent way to produce one and build an
//! [`IntegrityCache`] from it.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use ftlcache::builder::CacheBuilder;
//!
//! let cache = CacheBuilder::new(500)
//!     .max_entry_weight(4096)
//!     .write_once(true)
//!     .strict(true)
//!     .lock_timeout(Duration::from_millis(50))
//!     .try_build()
//!     .unwrap();
//! assert_eq!(cache.capacity(), 500);
//! ```

use std::time::Duration;

use crate::error::ConfigError;
use crate::store::integrity::IntegrityCache;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_MAX_ENTRY_WEIGHT: usize = 10_000;
pub const DEFAULT_MAX_ERRORS_PER_ENTRY: usize = 50;
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 10_000;

/// Settings for an [`IntegrityCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries. `0` disables storage.
    pub capacity: usize,
    /// Maximum byte length of one entry's formatted text.
    pub max_entry_weight: usize,
    pub max_errors_per_entry: usize,
    /// Reject differing writes to an existing key.
    pub write_once: bool,
    /// Surface corruption as an error instead of evicting and missing.
    pub strict: bool,
    /// Keep an audit trail of cache operations.
    pub audit: bool,
    pub max_audit_entries: usize,
    /// Applied to every lock acquisition made by the cache. `None` blocks.
    pub lock_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_entry_weight: DEFAULT_MAX_ENTRY_WEIGHT,
            max_errors_per_entry: DEFAULT_MAX_ERRORS_PER_ENTRY,
            write_once: false,
            strict: false,
            audit: false,
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
            lock_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entry_weight == 0 {
            return Err(ConfigError::new("max_entry_weight must be > 0"));
        }
        if self.audit && self.max_audit_entries == 0 {
            return Err(ConfigError::new(
                "max_audit_entries must be > 0 when audit is enabled",
            ));
        }
        Ok(())
    }
}

/// Builder for [`IntegrityCache`] instances.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    /// Create a new cache builder with the specified capacity and defaults
    /// for everything else.
    pub fn new(capacity: usize) -> Self {
        Self {
            config: CacheConfig {
                capacity,
                ..CacheConfig::default()
            },
        }
    }

    pub fn max_entry_weight(mut self, weight: usize) -> Self {
        self.config.max_entry_weight = weight;
        self
    }

    pub fn max_errors_per_entry(mut self, max: usize) -> Self {
        self.config.max_errors_per_entry = max;
        self
    }

    pub fn write_once(mut self, enabled: bool) -> Self {
        self.config.write_once = enabled;
        self
    }

    pub fn strict(mut self, enabled: bool) -> Self {
        self.config.strict = enabled;
        self
    }

    pub fn audit(mut self, enabled: bool) -> Self {
        self.config.audit = enabled;
        self
    }

    pub fn max_audit_entries(mut self, max: usize) -> Self {
        self.config.max_audit_entries = max;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = Some(timeout);
        self
    }

    /// Returns the configuration built so far.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Build the cache without validating the configuration.
    pub fn build(self) -> IntegrityCache {
        IntegrityCache::with_config(self.config)
    }

    /// Validate the configuration, then build the cache.
    pub fn try_build(self) -> Result<IntegrityCache, ConfigError> {
        self.config.validate()?;
        Ok(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert!(!config.write_once);
        assert!(!config.strict);
        assert_eq!(config.lock_timeout, None);
    }

    #[test]
    fn builder_sets_every_field() {
        let builder = CacheBuilder::new(3)
            .max_entry_weight(10)
            .max_errors_per_entry(2)
            .write_once(true)
            .strict(true)
            .audit(true)
            .max_audit_entries(5)
            .lock_timeout(Duration::from_millis(7));
        assert_eq!(
            builder.config(),
            &CacheConfig {
                capacity: 3,
                max_entry_weight: 10,
                max_errors_per_entry: 2,
                write_once: true,
                strict: true,
                audit: true,
                max_audit_entries: 5,
                lock_timeout: Some(Duration::from_millis(7)),
            }
        );
        let cache = builder.try_build().unwrap();
        assert_eq!(cache.capacity(), 3);
    }

    #[test]
    fn zero_weight_is_rejected() {
        let err = CacheBuilder::new(3).max_entry_weight(0).try_build().unwrap_err();
        assert!(err.message().contains("max_entry_weight"));
    }

    #[test]
    fn audit_without_room_is_rejected() {
        let err = CacheBuilder::new(3)
            .audit(true)
            .max_audit_entries(0)
            .try_build()
            .unwrap_err();
        assert!(err.message().contains("max_audit_entries"));
    }

    #[test]
    fn zero_capacity_is_honored() {
        let cache = CacheBuilder::new(0).build();
        assert_eq!(cache.capacity(), 0);
    }
}
