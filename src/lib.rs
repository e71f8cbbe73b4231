//! ftlcache: integrity-verified, concurrency-safe format cache for Fluent
//! (FTL) localization bundles.
//!
//! - [`sync::RwLock`]: writer-preferring reader-writer lock with reentrant
//!   reads and flat nesting rules.
//! - [`key::normalize`]: canonical [`key::CacheKey`] for a format request.
//! - [`store::IntegrityCache`]: bounded, checksum-verified result store.
//! - [`bundle::CachedFormatter`]: memoizes a [`bundle::Resolver`].
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod args;
pub mod builder;
pub mod bundle;
pub mod error;
pub mod key;
pub mod metrics;
pub mod prelude;
pub mod store;
pub mod sync;
