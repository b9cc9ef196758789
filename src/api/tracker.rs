//! The tracker service object.
//!
//! A [`Tracker`] owns one lock, one lazily created table and one system
//! allocator. Every method on it takes the lock around the whole operation.
//! To compose several steps under a single acquisition, call
//! [`Tracker::lock`] and use the `*_without_lock` forms on the returned
//! [`TrackerGuard`].
//!
//! Calling a locking method of a tracker while holding a guard of the same
//! tracker deadlocks.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::ptr::NonNull;

use crate::allocators::{LibcAllocator, SystemAllocator};
use crate::api::config::TrackerConfig;
use crate::api::error::{LastError, TrackError};
use crate::api::guard::TrackerGuard;
use crate::api::report::{write_entries, ShutdownReport};
use crate::api::stats::TrackerStats;
use crate::core::entry::{DefaultMetadata, Entry, Metadata, Site};
use crate::core::table::{create_with_retries, EntryMap};
use crate::diagnostics::{emit_with_context, Diagnostic, MT901, MT902};
use crate::sync::lock::{DefaultLock, LazyRawLock, RawLock};
use crate::sync::mutex::Mutex;

pub(crate) type Map<M> = HashMap<usize, Entry<M>>;

/// The table handle: absent until first use, gone after shutdown.
pub(crate) enum TableSlot<M> {
    Uninit,
    Live(Map<M>),
    Destroyed,
}

impl<M> TableSlot<M> {
    pub(crate) fn live(&mut self) -> Option<&mut Map<M>> {
        match self {
            TableSlot::Live(table) => Some(table),
            _ => None,
        }
    }

    pub(crate) fn live_ref(&self) -> Option<&Map<M>> {
        match self {
            TableSlot::Live(table) => Some(table),
            _ => None,
        }
    }
}

/// Everything the lock protects.
pub(crate) struct State<M> {
    pub(crate) table: TableSlot<M>,
    pub(crate) stats: TrackerStats,
}

/// Allocation tracker.
///
/// `M` picks the entry metadata ([`Lean`](crate::Lean) or
/// [`Detailed`](crate::Detailed)), `L` the lock backend and `A` the system
/// allocator that provides the memory.
///
/// ```
/// use memtrack::{site, Lean, Tracker};
///
/// let tracker = Tracker::<Lean>::new();
/// let block = tracker.malloc(64, site!()).unwrap();
/// assert_eq!(tracker.get_size(block.as_ptr(), site!()), 64);
/// unsafe { tracker.free(block.as_ptr(), site!()) };
/// assert_eq!(tracker.len(), 0);
/// ```
pub struct Tracker<M: Metadata = DefaultMetadata, L: RawLock = DefaultLock, A: SystemAllocator = LibcAllocator> {
    pub(crate) lock: LazyRawLock<L>,
    pub(crate) state: UnsafeCell<State<M>>,
    pub(crate) allocator: A,
    pub(crate) config: TrackerConfig,
    last_error: Mutex<Option<LastError>>,
    on_first_table: Option<fn()>,
}

// SAFETY: `state` is only reached through a `TrackerGuard`, which exists only
// while `lock` is held.
unsafe impl<M: Metadata, L: RawLock, A: SystemAllocator> Sync for Tracker<M, L, A> {}

impl<M: Metadata, L: RawLock, A: SystemAllocator + Default> Tracker<M, L, A> {
    /// Create a tracker with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Create a tracker with a custom configuration.
    pub fn with_config(config: TrackerConfig) -> Self {
        Self::with_allocator(config, A::default())
    }
}

impl<M: Metadata, L: RawLock, A: SystemAllocator + Default> Default for Tracker<M, L, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Metadata, L: RawLock, A: SystemAllocator> Tracker<M, L, A> {
    /// Create a tracker over a specific system allocator.
    pub fn with_allocator(config: TrackerConfig, allocator: A) -> Self {
        Self {
            lock: LazyRawLock::new(),
            state: UnsafeCell::new(State {
                table: TableSlot::Uninit,
                stats: TrackerStats::new(),
            }),
            allocator,
            config,
            last_error: Mutex::new(None),
            on_first_table: None,
        }
    }

    /// Run `hook` the first time this tracker creates its table.
    pub(crate) fn with_first_table_hook(mut self, hook: fn()) -> Self {
        self.on_first_table = Some(hook);
        self
    }

    /// The configuration this tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The system allocator behind this tracker.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Name of the metadata variant.
    pub fn metadata_name(&self) -> &'static str {
        M::NAME
    }

    /// Name of the lock backend.
    pub fn lock_name(&self) -> &'static str {
        self.lock.backend_name()
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Acquire the lock and return a guard that releases it on drop.
    ///
    /// Creates the table if this is the first use.
    pub fn lock(&self) -> TrackerGuard<'_, M, L, A> {
        let mut guard = self.acquire();
        guard.bootstrap_or_exit();
        guard
    }

    fn acquire(&self) -> TrackerGuard<'_, M, L, A> {
        self.lock.lock();
        // SAFETY: the lock was just taken.
        unsafe { TrackerGuard::new(self) }
    }

    /// Take the lock without producing a guard.
    ///
    /// Pair with [`assume_locked`](Self::assume_locked) or
    /// [`raw_unlock`](Self::raw_unlock).
    pub fn raw_lock(&self) {
        self.lock.lock();
    }

    /// Release a lock taken with [`raw_lock`](Self::raw_lock).
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock and no guard may be alive.
    pub unsafe fn raw_unlock(&self) {
        self.lock.unlock();
    }

    /// Build a guard for a lock the caller already holds.
    ///
    /// Dropping the guard releases the lock.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock (via [`raw_lock`](Self::raw_lock))
    /// and no other guard for this tracker may be alive.
    pub unsafe fn assume_locked(&self) -> TrackerGuard<'_, M, L, A> {
        let mut guard = TrackerGuard::new(self);
        guard.bootstrap_or_exit();
        guard
    }

    // =========================================================================
    // Table bootstrap
    // =========================================================================

    /// Create the table now instead of on first use.
    ///
    /// Unlike the implicit bootstrap, failure is returned instead of
    /// terminating the process. Fails with
    /// [`TrackError::TableUnavailable`] after shutdown.
    pub fn try_init(&self) -> Result<(), TrackError> {
        let mut guard = self.acquire();
        guard.bootstrap()?;
        match guard.state.table {
            TableSlot::Live(_) => Ok(()),
            _ => Err(TrackError::TableUnavailable),
        }
    }

    /// Whether the table has been created and not yet destroyed.
    pub fn is_initialized(&self) -> bool {
        self.acquire().state.table.live_ref().is_some()
    }

    pub(crate) fn bootstrap(&self, slot: &mut TableSlot<M>) -> Result<(), TrackError> {
        if !matches!(slot, TableSlot::Uninit) {
            return Ok(());
        }

        let capacity = self.config.initial_capacity;
        let attempts = self.config.creation_attempts;
        match create_with_retries::<Map<M>, Entry<M>>(capacity, attempts) {
            Ok(table) => {
                *slot = TableSlot::Live(table);
                if let Some(hook) = self.on_first_table {
                    hook();
                }
                Ok(())
            }
            Err(_) => Err(self.fail(
                "init",
                &MT901,
                TrackError::TableUnavailable,
                &format!("capacity={} attempts={}", capacity, attempts.max(1)),
            )),
        }
    }

    /// The live table, creating it on first use.
    pub(crate) fn table<'s>(
        &self,
        slot: &'s mut TableSlot<M>,
        operation: &'static str,
        site: Site,
    ) -> Result<&'s mut Map<M>, TrackError> {
        if self.bootstrap(slot).is_err() {
            std::process::exit(1);
        }
        match slot {
            TableSlot::Live(table) => Ok(table),
            _ => Err(self.fail(
                operation,
                &MT902,
                TrackError::TableUnavailable,
                &site.to_string(),
            )),
        }
    }

    // =========================================================================
    // Diagnostics and the last-failure marker
    // =========================================================================

    /// Send `diag` to the configured sink and the global emitter.
    pub(crate) fn raise(&self, diag: &Diagnostic, context: &str) {
        if let Some(sink) = &self.config.sink {
            sink.emit(diag, Some(context));
        }
        emit_with_context(diag, context);
    }

    /// Record `error` as the last failure of `operation`, raise `diag`.
    pub(crate) fn fail(
        &self,
        operation: &'static str,
        diag: &Diagnostic,
        error: TrackError,
        context: &str,
    ) -> TrackError {
        *self.last_error.lock() = Some(LastError { operation, error });
        self.raise(diag, context);
        error
    }

    /// The most recent failure recorded by this tracker.
    pub fn last_error(&self) -> Option<LastError> {
        *self.last_error.lock()
    }

    /// Forget the recorded failure.
    pub fn clear_last_error(&self) {
        *self.last_error.lock() = None;
    }

    // =========================================================================
    // Locking wrappers
    // =========================================================================

    /// Allocate `size` bytes.
    pub fn malloc(&self, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().malloc_without_lock(size, site)
    }

    /// Allocate `count * size` zeroed bytes.
    pub fn calloc(&self, count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().calloc_without_lock(count, size, site)
    }

    /// Resize a block. `Ok(None)` means `size` was zero and the block was
    /// released.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this tracker's allocator. On
    /// success it must no longer be used.
    pub unsafe fn realloc(
        &self,
        ptr: *mut u8,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock().realloc_without_lock(ptr, size, site)
    }

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a block from this tracker's allocator.
    pub unsafe fn free(&self, ptr: *mut u8, site: Site) {
        self.lock().free_without_lock(ptr, site)
    }

    /// Resize a block to `size` bytes, zeroing any bytes past the old size.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`](Self::realloc).
    pub unsafe fn recalloc(
        &self,
        ptr: *mut u8,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock().recalloc_without_lock(ptr, size, site)
    }

    /// Allocate `count * size` bytes with overflow checking.
    pub fn malloc_array(&self, count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().malloc_array_without_lock(count, size, site)
    }

    /// Zeroed array allocation.
    pub fn calloc_array(&self, count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().calloc_array_without_lock(count, size, site)
    }

    /// Resize to `count * size` bytes with overflow checking.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`](Self::realloc).
    pub unsafe fn realloc_array(
        &self,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock().realloc_array_without_lock(ptr, count, size, site)
    }

    /// Resize to `count * size` bytes, zeroing the new tail.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`](Self::realloc).
    pub unsafe fn recalloc_array(
        &self,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock().recalloc_array_without_lock(ptr, count, size, site)
    }

    /// Tracked size of `ptr`, or 0 if it is not tracked.
    pub fn get_size(&self, ptr: *const u8, site: Site) -> usize {
        self.lock().get_size_without_lock(ptr, site)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<Entry<M>> {
        self.acquire()
            .state
            .table
            .live_ref()
            .map(|table| table.enumerate())
            .unwrap_or_default()
    }

    /// Number of entries in the table, live or released.
    pub fn len(&self) -> usize {
        self.acquire()
            .state
            .table
            .live_ref()
            .map_or(0, |table| table.len())
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters maintained by the entry primitives.
    pub fn stats(&self) -> TrackerStats {
        self.acquire().state.stats
    }

    /// Write a report of every entry to `out`.
    ///
    /// The snapshot is taken under the lock; writing happens after the lock
    /// is released.
    pub fn write_report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let entries = self.snapshot();
        write_entries(&entries, out)
    }

    /// Print a report of every entry to stdout.
    pub fn report_all(&self) {
        let stdout = io::stdout();
        let _ = self.write_report(&mut stdout.lock());
    }

    /// Report and release everything still live, then destroy the table.
    ///
    /// Only the first call does any work; later calls return an empty
    /// report. After shutdown, allocations still succeed but are not
    /// tracked.
    pub fn shutdown(&self) -> ShutdownReport<M> {
        let report = self.acquire().shutdown_without_lock();
        self.lock.destroy();
        report
    }
}

impl<M: Metadata, L: RawLock, A: SystemAllocator> std::fmt::Debug for Tracker<M, L, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("metadata", &M::NAME)
            .field("lock", &L::NAME)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
