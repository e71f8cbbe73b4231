//! Bundle-side integration: memoizes a [`Resolver`] through an
//! [`IntegrityCache`].
//!
//! ## Data Flow
//!
//! ```text
//!   format(id, args, attr)
//!        │
//!        ▼
//!   normalize ──(unhashable)──────────────────────────────► resolve (uncached)
//!        │
//!        ▼
//!   cache.get ──(hit)──► clone payload
//!        │    ──(lock timeout)──────────────────────────────► resolve (uncached)
//!        │    ──(strict corruption)──► FormatError::Cache
//!        ▼ miss
//!   resolver.resolve ──(hard error)──► FormatError::Resolution (never cached)
//!        │
//!        ▼
//!   cache.put ──(write conflict)──► FormatError::Cache
//!        │
//!        ▼
//!   (text, errors)
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use ftlcache::args::ArgBag;
//! use ftlcache::builder::CacheBuilder;
//! use ftlcache::bundle::CachedFormatter;
//! use ftlcache::error::ResolutionError;
//! use ftlcache::store::ErrorRecord;
//!
//! let resolver = |id: &str, _args: &ArgBag, _attr: Option<&str>| {
//!     Ok::<_, ResolutionError>((format!("<{id}>"), Vec::<ErrorRecord>::new()))
//! };
//! let formatter = CachedFormatter::new(resolver, CacheBuilder::new(16).build());
//!
//! let (text, errors) = formatter.format("hello", &ArgBag::new(), None).unwrap();
//! assert_eq!(text, "<hello>");
//! assert!(errors.is_empty());
//! formatter.format("hello", &ArgBag::new(), None).unwrap();
//! assert_eq!(formatter.cache().unwrap().stats().hits, 1);
//! ```

use crate::args::ArgBag;
use crate::error::{CacheError, FormatError, ResolutionError};
use crate::key::normalize;
use crate::store::{ErrorRecord, IntegrityCache};

/// The expensive formatting operation the cache memoizes.
///
/// Implementations should be deterministic for identical inputs; a
/// write-once cache reports violations as
/// [`CacheError::WriteConflict`].
pub trait Resolver {
    fn resolve(
        &self,
        message_id: &str,
        args: &ArgBag,
        attribute: Option<&str>,
    ) -> Result<(String, Vec<ErrorRecord>), ResolutionError>;
}

impl<F> Resolver for F
where
    F: Fn(&str, &ArgBag, Option<&str>) -> Result<(String, Vec<ErrorRecord>), ResolutionError>,
{
    fn resolve(
        &self,
        message_id: &str,
        args: &ArgBag,
        attribute: Option<&str>,
    ) -> Result<(String, Vec<ErrorRecord>), ResolutionError> {
        self(message_id, args, attribute)
    }
}

/// Formats messages through a resolver, caching results.
#[derive(Debug)]
pub struct CachedFormatter<R> {
    resolver: R,
    cache: Option<IntegrityCache>,
}

impl<R: Resolver> CachedFormatter<R> {
    pub fn new(resolver: R, cache: IntegrityCache) -> Self {
        Self {
            resolver,
            cache: Some(cache),
        }
    }

    /// A formatter that resolves every request.
    pub fn without_cache(resolver: R) -> Self {
        Self {
            resolver,
            cache: None,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn cache(&self) -> Option<&IntegrityCache> {
        self.cache.as_ref()
    }

    /// Drops every cached result, e.g. after the bundle's resources change.
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Formats `message_id` (or one of its attributes) with `args`.
    pub fn format(
        &self,
        message_id: &str,
        args: &ArgBag,
        attribute: Option<&str>,
    ) -> Result<(String, Vec<ErrorRecord>), FormatError> {
        let Some(cache) = &self.cache else {
            return Ok(self.resolver.resolve(message_id, args, attribute)?);
        };

        let key = match normalize(message_id, attribute, args) {
            Ok(key) => key,
            Err(err) => {
                cache.note_unhashable_skip();
                tracing::debug!(message_id, error = %err, "bypassing format cache");
                return Ok(self.resolver.resolve(message_id, args, attribute)?);
            },
        };

        match cache.get(&key) {
            Ok(Some(entry)) => return Ok(entry.to_parts()),
            Ok(None) => {},
            Err(CacheError::Lock(err)) => {
                tracing::warn!(message_id, error = %err, "format cache unavailable, resolving directly");
                return Ok(self.resolver.resolve(message_id, args, attribute)?);
            },
            Err(err) => return Err(err.into()),
        }

        let (formatted, errors) = self.resolver.resolve(message_id, args, attribute)?;
        match cache.put(key, formatted.clone(), errors.clone()) {
            Ok(()) => {},
            Err(CacheError::Lock(err)) => {
                tracing::warn!(message_id, error = %err, "format result not cached");
            },
            Err(err) => return Err(err.into()),
        }
        Ok((formatted, errors))
    }
}
