//! Tracker lock backends.
//!
//! Every table access happens with exactly one process-wide lock held. The
//! lock is split from the data it protects: the tracker keeps the table in an
//! `UnsafeCell` and hands out access only through a guard that proves the lock
//! is held. That split is what lets callers compose multi-step operations
//! (`lock`, several `*_without_lock` calls, `unlock`) without re-entering the
//! lock.
//!
//! Backends:
//!
//! | Backend       | Facility                              | Feature       |
//! |---------------|---------------------------------------|---------------|
//! | [`OsLock`]    | kernel mutex + condition variable     | (default)     |
//! | [`SpinLock`]  | spin loop over an `AtomicBool`        | `spin`        |
//! | [`ParkingLock`] | `parking_lot` raw mutex             | `parking_lot` |
//!
//! None of them is reentrant. Locking twice from the same thread deadlocks.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, OnceLock, PoisonError};

/// A raw, guard-less mutual-exclusion primitive.
///
/// # Safety
///
/// Implementations must guarantee that between a `lock()` (or successful
/// `try_lock()`) and the matching `unlock()` no other thread can complete a
/// `lock()` on the same instance.
pub unsafe trait RawLock: Send + Sync + 'static {
    /// Short backend name for reports.
    const NAME: &'static str;

    /// Construct an unlocked instance.
    fn new() -> Self
    where
        Self: Sized;

    /// Block until exclusive ownership is obtained.
    fn lock(&self);

    /// Try to obtain exclusive ownership without blocking.
    fn try_lock(&self) -> bool;

    /// Release ownership.
    ///
    /// # Safety
    ///
    /// The calling thread must currently hold the lock.
    unsafe fn unlock(&self);

    /// Release any OS resources held by the primitive.
    ///
    /// Called at most once, during shutdown, after the table is gone.
    fn destroy(&self) {}
}

// =============================================================================
// SpinLock
// =============================================================================

/// Spinlock over an atomic flag.
///
/// Usable in `const` context, so it doubles as the statically
/// pre-initialized lock for targets without a one-shot init facility.
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Create an unlocked spinlock.
    pub const fn new_const() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

unsafe impl RawLock for SpinLock {
    const NAME: &'static str = "spin";

    fn new() -> Self {
        Self::new_const()
    }

    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        debug_assert!(self.locked.load(Ordering::Relaxed), "unlock of a free SpinLock");
        self.locked.store(false, Ordering::Release);
    }
}

// =============================================================================
// OsLock
// =============================================================================

/// Kernel-backed lock: a `std` mutex guarding a "held" flag plus a condition
/// variable for waiters.
///
/// The std mutex is only held for the few instructions it takes to flip the
/// flag, so ownership can be released from a different call than the one
/// that acquired it.
pub struct OsLock {
    held: Mutex<bool>,
    released: Condvar,
}

unsafe impl RawLock for OsLock {
    const NAME: &'static str = "os";

    fn new() -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    fn lock(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    fn try_lock(&self) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    unsafe fn unlock(&self) {
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            debug_assert!(*held, "unlock of a free OsLock");
            *held = false;
        }
        self.released.notify_one();
    }
}

// =============================================================================
// ParkingLock
// =============================================================================

/// `parking_lot`'s raw mutex (adaptive spinning, then parking).
#[cfg(feature = "parking_lot")]
pub struct ParkingLock(parking_lot::RawMutex);

#[cfg(feature = "parking_lot")]
unsafe impl RawLock for ParkingLock {
    const NAME: &'static str = "parking_lot";

    fn new() -> Self {
        Self(<parking_lot::RawMutex as lock_api::RawMutex>::INIT)
    }

    fn lock(&self) {
        lock_api::RawMutex::lock(&self.0);
    }

    fn try_lock(&self) -> bool {
        lock_api::RawMutex::try_lock(&self.0)
    }

    unsafe fn unlock(&self) {
        lock_api::RawMutex::unlock(&self.0);
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Lock backend selected by build configuration.
#[cfg(feature = "parking_lot")]
pub type DefaultLock = ParkingLock;

/// Lock backend selected by build configuration.
#[cfg(all(feature = "spin", not(feature = "parking_lot")))]
pub type DefaultLock = SpinLock;

/// Lock backend selected by build configuration.
#[cfg(not(any(feature = "spin", feature = "parking_lot")))]
pub type DefaultLock = OsLock;

// =============================================================================
// Lazy, exactly-once initialization
// =============================================================================

/// A lock backend that is constructed on first use.
///
/// Construction goes through `OnceLock`, so concurrent first callers agree on
/// a single instance. `destroy` forwards to the backend at most once.
pub struct LazyRawLock<L: RawLock> {
    cell: OnceLock<L>,
    destroyed: AtomicBool,
}

impl<L: RawLock> LazyRawLock<L> {
    /// Create an uninitialized lock.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Whether the backend has been constructed yet.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    fn backend(&self) -> &L {
        self.cell.get_or_init(L::new)
    }

    /// Acquire, initializing the backend on the first call.
    pub fn lock(&self) {
        self.backend().lock();
    }

    /// Try to acquire without blocking.
    pub fn try_lock(&self) -> bool {
        self.backend().try_lock()
    }

    /// Release.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    pub unsafe fn unlock(&self) {
        match self.cell.get() {
            Some(backend) => backend.unlock(),
            None => debug_assert!(false, "unlock before the lock was ever taken"),
        }
    }

    /// Release the backend's OS resources. Returns `true` only for the call
    /// that actually performed the teardown.
    pub fn destroy(&self) -> bool {
        match self.cell.get() {
            Some(backend) if !self.destroyed.swap(true, Ordering::AcqRel) => {
                backend.destroy();
                true
            }
            _ => false,
        }
    }

    /// Backend name.
    pub fn backend_name(&self) -> &'static str {
        L::NAME
    }
}

impl<L: RawLock> Default for LazyRawLock<L> {
    fn default() -> Self {
        Self::new()
    }
}
