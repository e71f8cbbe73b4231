//! Writer-preferring reader-writer lock with flat nesting rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            RwLock<T>                                    │
//! │                                                                         │
//! │   ┌──────────────────────────────┐     ┌──────────────────────────┐     │
//! │   │ Mutex<LockState>             │     │ UnsafeCell<T>            │     │
//! │   │   active_readers: usize      │     │   (protected value)      │     │
//! │   │   writer: Option<ThreadId>   │     └──────────────────────────┘     │
//! │   │   waiting_writers: usize     │                                      │
//! │   │   reader_holds: ThreadId→n   │     readers_cv ◄── writer released   │
//! │   └──────────────────────────────┘     writers_cv ◄── lock went Free    │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! State machine
//! ─────────────
//!
//!            read (no writer, none waiting)
//!    ┌──────┐ ───────────────────────────► ┌────────────┐
//!    │ Free │                              │ Reading(n) │ ◄─┐ read (reentrant or
//!    └──────┘ ◄─────────────────────────── └────────────┘ ──┘  no writer waiting)
//!      │  ▲      last reader releases
//!      │  │
//!      │  │ writer releases
//!      ▼  │
//!    ┌─────────┐
//!    │ Writing │
//!    └─────────┘
//! ```
//!
//! ## Nesting Rules
//!
//! | Held by caller | `read()`          | `write()`                   |
//! |----------------|-------------------|-----------------------------|
//! | nothing        | blocks/acquires   | blocks/acquires             |
//! | read guard     | granted at once   | `LockMisuse::Upgrade`       |
//! | write guard    | `LockMisuse::Downgrade` | `LockMisuse::ReentrantWrite` |
//!
//! ## Writer Preference
//!
//! A new (non-reentrant) reader waits while a writer is active **or waiting**.
//! A writer that starts waiting is therefore served before any reader that
//! arrives after it. Reentrant reads are always granted immediately; making
//! them wait on a queued writer would deadlock the holder against itself.
//!
//! ## Timeouts
//!
//! `None` blocks indefinitely, `Some(Duration::ZERO)` fails at once if the
//! lock is unavailable. A timed-out attempt leaves `waiting_writers` and
//! `active_readers` exactly as they were before the call. Float-second
//! variants ([`RwLock::read_secs`], [`RwLock::write_secs`]) reject negative
//! and NaN values before touching shared state.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use ftlcache::sync::RwLock;
//!
//! let lock = RwLock::new(vec![1, 2, 3]);
//! {
//!     let a = lock.read(None).unwrap();
//!     let b = lock.read(None).unwrap(); // reentrant read
//!     assert_eq!(a.len(), b.len());
//!     assert!(lock.write(Some(Duration::ZERO)).unwrap_err().is_misuse());
//! }
//! lock.write(None).unwrap().push(4);
//! assert_eq!(lock.read(None).unwrap().len(), 4);
//! ```
//!
//! ## Thread Safety
//!
//! Guards are `!Send`: a guard is released on the thread that acquired it,
//! which is what per-thread hold tracking relies on.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::error::{LockError, LockMisuse, LockMode};

/// Coarse lock state, as described by the module-level state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    Reading(usize),
    Writing,
}

/// Point-in-time copy of the lock's internal accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockSnapshot {
    pub active_readers: usize,
    pub writer_active: bool,
    pub waiting_writers: usize,
}

#[derive(Debug, Default)]
struct LockState {
    /// Distinct threads currently holding a read guard.
    active_readers: usize,
    writer: Option<ThreadId>,
    waiting_writers: usize,
    /// Per-thread read recursion depth.
    reader_holds: FxHashMap<ThreadId, usize>,
}

impl LockState {
    #[inline]
    fn read_available(&self) -> bool {
        self.writer.is_none() && self.waiting_writers == 0
    }

    #[inline]
    fn write_available(&self) -> bool {
        self.writer.is_none() && self.active_readers == 0
    }
}

/// Reader-writer lock with reentrant reads, rejected reentrant writes,
/// rejected upgrade/downgrade, timeouts and writer preference.
pub struct RwLock<T: ?Sized> {
    state: Mutex<LockState>,
    readers_cv: Condvar,
    writers_cv: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY:
// Access to `data` only happens through a live guard. A `ReadGuard` exists
// only while its thread is counted in `reader_holds` and no writer is
// recorded; a `WriteGuard` only while `writer` names its thread and
// `active_readers == 0`. Holds are created and dropped solely by guard
// construction and guard release, so no hold can end while its guard lives.
unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

/// Converts a float-seconds timeout into the lock's `Option<Duration>` form.
///
/// Negative or NaN values are rejected; `+inf` and values too large for a
/// `Duration` mean "block indefinitely".
pub fn timeout_from_secs(secs: f64) -> Result<Option<Duration>, LockError> {
    if secs.is_nan() || secs < 0.0 {
        return Err(LockError::InvalidTimeout(secs));
    }
    if secs.is_infinite() {
        return Ok(None);
    }
    Ok(Duration::try_from_secs_f64(secs).ok())
}

impl<T> RwLock<T> {
    /// Creates an unlocked lock protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Acquires a shared guard.
    ///
    /// Reentrant on the calling thread. Yields to waiting writers when the
    /// calling thread does not already hold a read guard.
    pub fn read(&self, timeout: Option<Duration>) -> Result<ReadGuard<'_, T>, LockError> {
        self.acquire_read(timeout)?;
        Ok(ReadGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Acquires the exclusive guard.
    pub fn write(&self, timeout: Option<Duration>) -> Result<WriteGuard<'_, T>, LockError> {
        self.acquire_write(timeout)?;
        Ok(WriteGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// [`read`](Self::read) with a timeout in (possibly fractional) seconds.
    pub fn read_secs(&self, secs: f64) -> Result<ReadGuard<'_, T>, LockError> {
        self.read(timeout_from_secs(secs)?)
    }

    /// [`write`](Self::write) with a timeout in (possibly fractional) seconds.
    pub fn write_secs(&self, secs: f64) -> Result<WriteGuard<'_, T>, LockError> {
        self.write(timeout_from_secs(secs)?)
    }

    /// Records a read hold for the calling thread. Only [`read`](Self::read)
    /// calls this, so every hold is owned by exactly one [`ReadGuard`].
    fn acquire_read(&self, timeout: Option<Duration>) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer == Some(me) {
            return Err(LockMisuse::Downgrade.into());
        }
        if let Some(depth) = state.reader_holds.get_mut(&me) {
            *depth += 1;
            return Ok(());
        }

        let start = Instant::now();
        let deadline = timeout.and_then(|t| start.checked_add(t));
        while !state.read_available() {
            if wait_on(&self.readers_cv, &mut state, deadline) && !state.read_available() {
                return Err(LockError::Timeout {
                    mode: LockMode::Read,
                    waited: start.elapsed(),
                });
            }
        }

        state.active_readers += 1;
        state.reader_holds.insert(me, 1);
        Ok(())
    }

    /// Records the write hold for the calling thread. Only
    /// [`write`](Self::write) calls this.
    fn acquire_write(&self, timeout: Option<Duration>) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer == Some(me) {
            return Err(LockMisuse::ReentrantWrite.into());
        }
        if state.reader_holds.contains_key(&me) {
            return Err(LockMisuse::Upgrade.into());
        }

        if !state.write_available() {
            let start = Instant::now();
            let deadline = timeout.and_then(|t| start.checked_add(t));
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(LockError::Timeout {
                    mode: LockMode::Write,
                    waited: start.elapsed(),
                });
            }

            state.waiting_writers += 1;
            while !state.write_available() {
                if wait_on(&self.writers_cv, &mut state, deadline) && !state.write_available() {
                    state.waiting_writers -= 1;
                    if state.waiting_writers == 0 {
                        // Readers parked behind this writer may proceed.
                        self.readers_cv.notify_all();
                    }
                    return Err(LockError::Timeout {
                        mode: LockMode::Write,
                        waited: start.elapsed(),
                    });
                }
            }
            state.waiting_writers -= 1;
        }

        state.writer = Some(me);
        Ok(())
    }

    /// Drops one read hold of the calling thread. Reached only from
    /// [`ReadGuard`], which gives up its access first.
    fn release_read(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let depth = match state.reader_holds.get_mut(&me) {
            Some(depth) => depth,
            None => return Err(LockMisuse::ReleaseNotHeld(LockMode::Read).into()),
        };
        if *depth > 1 {
            *depth -= 1;
            return Ok(());
        }
        state.reader_holds.remove(&me);
        state.active_readers -= 1;
        if state.active_readers == 0 {
            self.writers_cv.notify_one();
        }
        Ok(())
    }

    /// Drops the write hold of the calling thread. Reached only from
    /// [`WriteGuard`].
    fn release_write(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.writer != Some(me) {
            return Err(LockMisuse::ReleaseNotHeld(LockMode::Write).into());
        }
        state.writer = None;
        if state.waiting_writers > 0 {
            self.writers_cv.notify_one();
        } else {
            self.readers_cv.notify_all();
        }
        Ok(())
    }

    /// Returns the coarse lock state.
    pub fn status(&self) -> LockStatus {
        let state = self.state.lock();
        if state.writer.is_some() {
            LockStatus::Writing
        } else if state.active_readers > 0 {
            LockStatus::Reading(state.active_readers)
        } else {
            LockStatus::Free
        }
    }

    /// Returns a copy of the internal counters.
    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.state.lock();
        LockSnapshot {
            active_readers: state.active_readers,
            writer_active: state.writer.is_some(),
            waiting_writers: state.waiting_writers,
        }
    }

    /// Returns `true` if the calling thread holds a read guard.
    pub fn is_read_held(&self) -> bool {
        let me = thread::current().id();
        self.state.lock().reader_holds.contains_key(&me)
    }

    /// Returns `true` if the calling thread holds the write guard.
    pub fn is_write_held(&self) -> bool {
        let me = thread::current().id();
        self.state.lock().writer == Some(me)
    }

    /// Mutable access through a unique borrow; no locking required.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Parks on `cv` until notified or `deadline` passes. Returns `true` if the
/// deadline has passed.
fn wait_on(cv: &Condvar, state: &mut MutexGuard<'_, LockState>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            cv.wait(state);
            false
        },
        Some(deadline) => {
            if Instant::now() >= deadline {
                return true;
            }
            cv.wait_until(state, deadline).timed_out()
        },
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLock")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Shared guard returned by [`RwLock::read`].
#[must_use = "the read hold is released as soon as the guard is dropped"]
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> ReadGuard<'_, T> {
    /// Releases the guard, reporting misuse instead of asserting.
    pub fn release(self) -> Result<(), LockError> {
        let lock = self.lock;
        std::mem::forget(self);
        lock.release_read()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadGuard").field(&&**self).finish()
    }
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this thread is counted as a reader, so no writer exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release_read() {
            tracing::error!(error = %err, "read guard release failed");
            if !thread::panicking() {
                debug_assert!(false, "read guard release failed: {err}");
            }
        }
    }
}

/// Exclusive guard returned by [`RwLock::write`].
#[must_use = "the write hold is released as soon as the guard is dropped"]
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> WriteGuard<'_, T> {
    /// Releases the guard, reporting misuse instead of asserting.
    pub fn release(self) -> Result<(), LockError> {
        let lock = self.lock;
        std::mem::forget(self);
        lock.release_write()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteGuard").field(&&**self).finish()
    }
}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this thread is the sole writer and no readers are active.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` prevents aliasing through this guard.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release_write() {
            tracing::error!(error = %err, "write guard release failed");
            if !thread::panicking() {
                debug_assert!(false, "write guard release failed: {err}");
            }
        }
    }
}
