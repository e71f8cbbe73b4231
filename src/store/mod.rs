//! Storage for formatted results.
//!
//! - [`entry`]: immutable [`CacheEntry`] values and their checksum.
//! - [`integrity`]: the bounded, verified [`IntegrityCache`].
//! - [`audit`]: optional audit trail of cache operations.

pub mod audit;
pub mod entry;
pub mod integrity;

pub use audit::{AuditEntry, AuditOp};
pub use entry::{CacheEntry, ErrorCategory, ErrorRecord, checksum};
pub use integrity::{CacheResult, IntegrityCache};
