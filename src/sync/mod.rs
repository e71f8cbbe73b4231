//! Synchronization primitives used by the cache layer.

pub mod rwlock;

pub use rwlock::{LockSnapshot, LockStatus, ReadGuard, RwLock, WriteGuard, timeout_from_secs};
