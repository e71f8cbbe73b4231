pub use crate::args::{ArgBag, ArgValue, OpaqueArg};
pub use crate::builder::{CacheBuilder, CacheConfig};
pub use crate::bundle::{CachedFormatter, Resolver};
pub use crate::error::{CacheError, FormatError, LockError, NormalizeError, ResolutionError};
pub use crate::key::{CacheKey, normalize};
pub use crate::metrics::CacheStats;
pub use crate::store::{CacheEntry, ErrorCategory, ErrorRecord, IntegrityCache};
pub use crate::sync::RwLock;
