//! Operations performed with the tracker lock held.
//!
//! A [`TrackerGuard`] is the proof that the lock is held. Everything that
//! reads or writes the table lives here: the entry primitives (`entry_add`,
//! `entry_update`, `entry_free`) used by adapter authors, and the
//! `*_without_lock` form of every allocation wrapper.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::allocators::SystemAllocator;
use crate::api::error::TrackError;
use crate::api::report::ShutdownReport;
use crate::api::tracker::{State, TableSlot, Tracker};
use crate::core::entry::{Entry, Metadata, ReleaseAction, Site};
use crate::core::table::EntryMap;
use crate::diagnostics::{
    MT001, MT002, MT003, MT004, MT101, MT201, MT202, MT203, MT204, MT205, MT206, MT207, MT301,
    MT302,
};
use crate::sync::lock::RawLock;
use crate::util::size::array_bytes;

/// Exclusive access to a tracker's table.
///
/// Dropping the guard releases the lock. The guard is not `Send`: the lock
/// must be released by the thread that took it.
pub struct TrackerGuard<'a, M: Metadata, L: RawLock, A: SystemAllocator> {
    pub(crate) tracker: &'a Tracker<M, L, A>,
    pub(crate) state: &'a mut State<M>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, M: Metadata, L: RawLock, A: SystemAllocator> TrackerGuard<'a, M, L, A> {
    /// # Safety
    ///
    /// The calling thread must hold `tracker`'s lock, and no other guard for
    /// it may exist.
    pub(crate) unsafe fn new(tracker: &'a Tracker<M, L, A>) -> Self {
        Self {
            tracker,
            state: &mut *tracker.state.get(),
            _not_send: PhantomData,
        }
    }

    pub(crate) fn bootstrap(&mut self) -> Result<(), TrackError> {
        self.tracker.bootstrap(&mut self.state.table)
    }

    pub(crate) fn bootstrap_or_exit(&mut self) {
        if self.bootstrap().is_err() {
            std::process::exit(1);
        }
    }

    /// Release the lock.
    pub fn unlock(self) {
        drop(self);
    }

    /// The tracker this guard locks.
    pub fn tracker(&self) -> &'a Tracker<M, L, A> {
        self.tracker
    }

    /// The system allocator behind the tracker.
    pub fn allocator(&self) -> &'a A {
        &self.tracker.allocator
    }

    /// Number of entries in the table, live or released.
    pub fn len(&self) -> usize {
        self.state.table.live_ref().map_or(0, |table| table.len())
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> Vec<Entry<M>> {
        self.state
            .table
            .live_ref()
            .map(|table| table.enumerate())
            .unwrap_or_default()
    }

    /// The entry tracked at `address`, if any.
    pub fn entry(&self, address: usize) -> Option<&Entry<M>> {
        self.state
            .table
            .live_ref()
            .and_then(|table| EntryMap::get(table, address))
    }

    // =========================================================================
    // Entry primitives
    // =========================================================================

    /// Start tracking `ptr` as a `size`-byte block allocated at `site`.
    ///
    /// Overwrites any entry already recorded for the address.
    pub fn entry_add(&mut self, ptr: *mut u8, size: usize, site: Site) -> Result<(), TrackError> {
        if ptr.is_null() {
            return Err(self.tracker.fail(
                "entry_add",
                &MT201,
                TrackError::NullPointer,
                &format!("{} size={}", site, size),
            ));
        }

        self.insert(Entry::new(ptr as usize, size, site), "entry_add", site)?;
        self.state.stats.record_add(size);
        Ok(())
    }

    /// Record that the block at `old` is now `new_size` bytes at `new`.
    ///
    /// A null `old` is a fresh add. When the block moved, the entry at `new`
    /// is inserted before the one at `old` is removed, so a failed insert
    /// leaves the old entry in place. An untracked `old` is reported and
    /// tracked as a fresh add.
    pub fn entry_update(
        &mut self,
        old: *mut u8,
        new: *mut u8,
        new_size: usize,
        site: Site,
    ) -> Result<(), TrackError> {
        if old.is_null() {
            return self.entry_add(new, new_size, site);
        }
        if new.is_null() {
            return Err(self.tracker.fail(
                "entry_update",
                &MT201,
                TrackError::NullPointer,
                &format!("{} old={:p} size={}", site, old, new_size),
            ));
        }

        let tracker = self.tracker;
        let (old_address, new_address) = (old as usize, new as usize);
        let table = tracker.table(&mut self.state.table, "entry_update", site)?;

        let Some(current) = EntryMap::get_mut(table, old_address) else {
            tracker.fail(
                "entry_update",
                &MT202,
                TrackError::Untracked {
                    address: old_address,
                },
                &format!("{} address={:#x} size={}", site, old_address, new_size),
            );
            return self.entry_add(new, new_size, site);
        };

        let old_size = current.size;
        let released = current.is_released();

        if old_address == new_address {
            current.size = new_size;
            current.meta.resized(site);
        } else {
            let mut moved = Entry {
                address: new_address,
                size: new_size,
                meta: current.meta.clone(),
            };
            moved.meta.resized(site);
            self.insert(moved, "entry_update", site)?;

            if let Some(table) = self.state.table.live() {
                table.delete(old_address);
            }
        }

        if !released {
            self.state.stats.shrink(old_size);
            self.state.stats.grow(new_size);
        }
        Ok(())
    }

    /// Apply a release of `ptr` performed at `site`.
    ///
    /// With lean metadata the entry is removed. With detailed metadata it is
    /// marked released, and a second release fails with
    /// [`TrackError::AlreadyReleased`]. Null is a no-op.
    ///
    /// This only updates the table; the caller still owns releasing the
    /// memory itself.
    pub fn entry_free(&mut self, ptr: *mut u8, site: Site) -> Result<(), TrackError> {
        if ptr.is_null() {
            return Ok(());
        }

        let tracker = self.tracker;
        let address = ptr as usize;
        let table = tracker.table(&mut self.state.table, "entry_free", site)?;

        let Some(entry) = EntryMap::get_mut(table, address) else {
            return Err(tracker.fail(
                "entry_free",
                &MT203,
                TrackError::Untracked { address },
                &format!("{} address={:#x}", site, address),
            ));
        };

        let size = entry.size;
        match entry.meta.release(site) {
            ReleaseAction::Remove => {
                table.delete(address);
                self.state.stats.record_release(size, false);
            }
            ReleaseAction::Retain => {
                self.state.stats.record_release(size, true);
            }
            ReleaseAction::Refuse { previous } => {
                self.state.stats.double_release_count += 1;
                return Err(tracker.fail(
                    "entry_free",
                    &MT205,
                    TrackError::AlreadyReleased { address, previous },
                    &released_context(site, address, size, previous),
                ));
            }
        }
        Ok(())
    }

    /// Insert `entry`, keeping the counters right if it displaces one.
    fn insert(&mut self, entry: Entry<M>, operation: &'static str, site: Site) -> Result<(), TrackError> {
        let tracker = self.tracker;
        let table = tracker.table(&mut self.state.table, operation, site)?;

        let address = entry.address;
        let displaced = EntryMap::get(&*table, address).map(|e| (e.size, e.is_released()));
        if table.set(address, entry).is_err() {
            return Err(tracker.fail(
                operation,
                &MT302,
                TrackError::InsertFailed { address },
                &format!("{} address={:#x}", site, address),
            ));
        }

        match displaced {
            Some((_, true)) => {
                self.state.stats.released_entries = self.state.stats.released_entries.saturating_sub(1);
            }
            Some((size, false)) => self.state.stats.forget_live(size),
            None => {}
        }
        Ok(())
    }

    /// Record a resize the system allocator has already carried out.
    ///
    /// If the entry for `new` cannot be inserted, the entry for `old` is
    /// dropped as well, since its memory no longer belongs to the caller.
    pub(crate) fn record_move(&mut self, old: *mut u8, new: *mut u8, size: usize, site: Site) {
        if let Err(TrackError::InsertFailed { .. }) = self.entry_update(old, new, size, site) {
            if old != new {
                self.forget(old as usize);
            }
        }
    }

    /// Drop the entry at `address` without releasing anything.
    pub(crate) fn forget(&mut self, address: usize) -> Option<Entry<M>> {
        let entry = self.state.table.live()?.delete(address)?;
        if entry.is_released() {
            self.state.stats.released_entries = self.state.stats.released_entries.saturating_sub(1);
        } else {
            self.state.stats.forget_live(entry.size);
        }
        Some(entry)
    }

    /// Refuse to touch a block whose entry is marked released.
    pub(crate) fn refuse_released(&mut self, ptr: *mut u8, operation: &'static str, site: Site) -> Result<(), TrackError> {
        let address = ptr as usize;
        let Some((size, Some(previous))) = self
            .state
            .table
            .live_ref()
            .and_then(|table| EntryMap::get(table, address))
            .map(|e| (e.size, e.meta.released_at()))
        else {
            return Ok(());
        };

        self.state.stats.double_release_count += 1;
        Err(self.tracker.fail(
            operation,
            &MT205,
            TrackError::AlreadyReleased {
                address,
                previous: Some(previous),
            },
            &released_context(site, address, size, Some(previous)),
        ))
    }

    /// Validate a `count * size` request.
    pub(crate) fn array_size(&self, operation: &'static str, count: usize, size: usize, site: Site) -> Result<usize, TrackError> {
        let context = || format!("{} count={} size={}", site, count, size);
        if count == 0 {
            return Err(self.tracker.fail(operation, &MT002, TrackError::ZeroCount, &context()));
        }
        if size == 0 {
            return Err(self.tracker.fail(operation, &MT001, TrackError::ZeroSize, &context()));
        }
        array_bytes(count, size)
            .ok_or_else(|| self.tracker.fail(operation, &MT003, TrackError::SizeOverflow, &context()))
    }

    pub(crate) fn allocation_failed(&self, operation: &'static str, size: usize, site: Site) -> TrackError {
        self.tracker.fail(
            operation,
            &MT101,
            TrackError::AllocationFailed { size },
            &format!("{} size={}", site, size),
        )
    }

    // =========================================================================
    // Wrappers
    // =========================================================================

    /// [`Tracker::malloc`] with the lock already held.
    pub fn malloc_without_lock(&mut self, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        if size == 0 {
            return Err(self.tracker.fail(
                "malloc",
                &MT001,
                TrackError::ZeroSize,
                &site.to_string(),
            ));
        }

        let block = NonNull::new(self.tracker.allocator.malloc(size))
            .ok_or_else(|| self.allocation_failed("malloc", size, site))?;
        let _ = self.entry_add(block.as_ptr(), size, site);
        Ok(block)
    }

    /// [`Tracker::calloc`] with the lock already held.
    pub fn calloc_without_lock(&mut self, count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        let bytes = self.array_size("calloc", count, size, site)?;

        let block = NonNull::new(self.tracker.allocator.calloc(count, size))
            .ok_or_else(|| self.allocation_failed("calloc", bytes, site))?;
        let _ = self.entry_add(block.as_ptr(), bytes, site);
        Ok(block)
    }

    /// [`Tracker::realloc`] with the lock already held.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracker::realloc`].
    pub unsafe fn realloc_without_lock(
        &mut self,
        ptr: *mut u8,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        if ptr.is_null() {
            return self.malloc_without_lock(size, site).map(Some);
        }
        if size == 0 {
            self.tracker
                .raise(&MT004, &format!("{} address={:p}", site, ptr));
            self.free_without_lock(ptr, site);
            return Ok(None);
        }
        self.refuse_released(ptr, "realloc", site)?;

        let moved = NonNull::new(self.tracker.allocator.realloc(ptr, size))
            .ok_or_else(|| self.allocation_failed("realloc", size, site))?;
        self.record_move(ptr, moved.as_ptr(), size, site);
        Ok(Some(moved))
    }

    /// [`Tracker::free`] with the lock already held.
    ///
    /// An untracked block is still handed to the system allocator. A block
    /// already marked released is not.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracker::free`].
    pub unsafe fn free_without_lock(&mut self, ptr: *mut u8, site: Site) {
        if ptr.is_null() {
            return;
        }
        match self.entry_free(ptr, site) {
            Err(TrackError::AlreadyReleased { .. }) => {}
            _ => self.tracker.allocator.free(ptr),
        }
    }

    /// [`Tracker::recalloc`] with the lock already held.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracker::realloc`].
    pub unsafe fn recalloc_without_lock(
        &mut self,
        ptr: *mut u8,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.recalloc_array_without_lock(ptr, 1, size, site)
    }

    /// [`Tracker::malloc_array`] with the lock already held.
    pub fn malloc_array_without_lock(
        &mut self,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let bytes = self.array_size("malloc_array", count, size, site)?;
        self.malloc_without_lock(bytes, site)
    }

    /// [`Tracker::calloc_array`] with the lock already held.
    pub fn calloc_array_without_lock(
        &mut self,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.calloc_without_lock(count, size, site)
    }

    /// [`Tracker::realloc_array`] with the lock already held.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracker::realloc`].
    pub unsafe fn realloc_array_without_lock(
        &mut self,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        let bytes = self.array_size("realloc_array", count, size, site)?;
        self.realloc_without_lock(ptr, bytes, site)
    }

    /// [`Tracker::recalloc_array`] with the lock already held.
    ///
    /// A null `ptr` is a zeroed allocation. An untracked `ptr` is reported
    /// and replaced by a fresh zeroed allocation; the untracked block itself
    /// is left alone.
    ///
    /// # Safety
    ///
    /// Same contract as [`Tracker::realloc`].
    pub unsafe fn recalloc_array_without_lock(
        &mut self,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        if ptr.is_null() {
            return self.calloc_without_lock(count, size, site).map(Some);
        }
        let bytes = self.array_size("recalloc", count, size, site)?;
        self.refuse_released(ptr, "recalloc", site)?;

        let address = ptr as usize;
        let tracked = self
            .state
            .table
            .live_ref()
            .and_then(|table| EntryMap::get(table, address))
            .map(|e| e.size);
        let Some(old_size) = tracked else {
            self.tracker.fail(
                "recalloc",
                &MT207,
                TrackError::Untracked { address },
                &format!("{} address={:#x} count={} size={}", site, address, count, size),
            );
            return self.calloc_without_lock(count, size, site).map(Some);
        };

        let moved = NonNull::new(self.tracker.allocator.realloc(ptr, bytes))
            .ok_or_else(|| self.allocation_failed("recalloc", bytes, site))?;
        if bytes > old_size {
            ptr::write_bytes(moved.as_ptr().add(old_size), 0, bytes - old_size);
        }
        self.record_move(ptr, moved.as_ptr(), bytes, site);
        Ok(Some(moved))
    }

    /// [`Tracker::get_size`] with the lock already held.
    pub fn get_size_without_lock(&mut self, ptr: *const u8, site: Site) -> usize {
        if ptr.is_null() {
            self.tracker
                .fail("get_size", &MT206, TrackError::NullPointer, &site.to_string());
            return 0;
        }

        let tracker = self.tracker;
        let address = ptr as usize;
        let Ok(table) = tracker.table(&mut self.state.table, "get_size", site) else {
            return 0;
        };
        match EntryMap::get(&*table, address) {
            Some(entry) => entry.size,
            None => {
                tracker.fail(
                    "get_size",
                    &MT204,
                    TrackError::Untracked { address },
                    &format!("{} address={:#x}", site, address),
                );
                0
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// [`Tracker::shutdown`] with the lock already held.
    ///
    /// Does not destroy the lock.
    pub fn shutdown_without_lock(&mut self) -> ShutdownReport<M> {
        let table = match std::mem::replace(&mut self.state.table, TableSlot::Destroyed) {
            TableSlot::Live(table) => table,
            TableSlot::Uninit | TableSlot::Destroyed => return ShutdownReport::default(),
        };

        let mut report = ShutdownReport::default();
        let report_leaks = self.tracker.config.report_leaks;
        let mut leak_contexts = Vec::new();
        for (_, mut entry) in table {
            if entry.is_released() {
                report.already_released += 1;
                continue;
            }
            if report_leaks {
                if let Some(context) = M::leak_context(&mut entry) {
                    leak_contexts.push(context);
                }
            }
            // SAFETY: live entries are blocks from this tracker's allocator.
            unsafe { self.tracker.allocator.free(entry.address as *mut u8) };
            report.leaked.push(entry);
        }

        let stats = &mut self.state.stats;
        stats.live_entries = 0;
        stats.released_entries = 0;
        stats.live_bytes = 0;

        // Every block is already released; strict mode may panic below.
        for context in &leak_contexts {
            self.tracker.raise(&MT301, context);
        }
        report
    }
}

impl<'a, M: Metadata, L: RawLock, A: SystemAllocator> Drop for TrackerGuard<'a, M, L, A> {
    fn drop(&mut self) {
        // SAFETY: a guard only exists while its thread holds the lock.
        unsafe { self.tracker.lock.unlock() }
    }
}

fn released_context(site: Site, address: usize, size: usize, previous: Option<Site>) -> String {
    match previous {
        Some(first) => format!(
            "{} address={:#x} size={}, first freed at {}",
            site, address, size, first
        ),
        None => format!("{} address={:#x} size={}", site, address, size),
    }
}
