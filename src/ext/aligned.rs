//! Alignment-constrained allocation.
//!
//! Blocks come from [`SystemAllocator::aligned_alloc`] and are tracked with
//! their full size. A resize always moves: a new aligned block is allocated,
//! the common prefix copied, the entry moved, and the old block released.

use std::ptr::{self, NonNull};

use crate::allocators::SystemAllocator;
use crate::api::error::TrackError;
use crate::api::guard::TrackerGuard;
use crate::api::tracker::Tracker;
use crate::core::entry::{Metadata, Site};
use crate::diagnostics::{MT001, MT004, MT202, MT401, MT402};
use crate::sync::lock::RawLock;
use crate::util::layout::{is_aligned_to, PTR_SIZE};

/// Check an aligned request.
///
/// `alignment` must be a power of two no smaller than a pointer; `size` must
/// be a non-zero multiple of `alignment`.
pub fn validate(alignment: usize, size: usize) -> Result<(), TrackError> {
    if !alignment.is_power_of_two() || alignment < PTR_SIZE {
        return Err(TrackError::InvalidAlignment { alignment });
    }
    if size == 0 {
        return Err(TrackError::ZeroSize);
    }
    if size < alignment || size % alignment != 0 {
        return Err(TrackError::SizeNotMultiple { size, alignment });
    }
    Ok(())
}

impl<'a, M: Metadata, L: RawLock, A: SystemAllocator> TrackerGuard<'a, M, L, A> {
    /// Validate and allocate without tracking.
    fn aligned_untracked(
        &mut self,
        operation: &'static str,
        alignment: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        if let Err(error) = validate(alignment, size) {
            let diag = match error {
                TrackError::InvalidAlignment { .. } => &MT401,
                TrackError::ZeroSize => &MT001,
                _ => &MT402,
            };
            let context = format!("{} alignment={} size={}", site, alignment, size);
            return Err(self.tracker.fail(operation, diag, error, &context));
        }

        let block = NonNull::new(self.tracker.allocator.aligned_alloc(alignment, size))
            .ok_or_else(|| self.allocation_failed(operation, size, site))?;
        debug_assert!(is_aligned_to(block.as_ptr(), alignment));
        Ok(block)
    }

    /// Size of the tracked block at `ptr`, failing `operation` if untracked.
    fn aligned_tracked_size(&self, operation: &'static str, ptr: *mut u8, site: Site) -> Result<usize, TrackError> {
        let address = ptr as usize;
        match self.entry(address) {
            Some(entry) => Ok(entry.size),
            None => Err(self.tracker.fail(
                operation,
                &MT202,
                TrackError::Untracked { address },
                &format!("{} address={:#x}", site, address),
            )),
        }
    }

    /// [`AlignedExt::aligned_alloc`] with the lock already held.
    pub fn aligned_alloc_without_lock(
        &mut self,
        alignment: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let block = self.aligned_untracked("aligned_alloc", alignment, size, site)?;
        let _ = self.entry_add(block.as_ptr(), size, site);
        Ok(block)
    }

    /// [`AlignedExt::aligned_calloc`] with the lock already held.
    pub fn aligned_calloc_without_lock(
        &mut self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let bytes = self.array_size("aligned_calloc", count, size, site)?;
        let block = self.aligned_alloc_without_lock(alignment, bytes, site)?;
        // SAFETY: the block was just allocated with `bytes` bytes.
        unsafe { ptr::write_bytes(block.as_ptr(), 0, bytes) };
        Ok(block)
    }

    /// [`AlignedExt::aligned_realloc`] with the lock already held.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live aligned block from this tracker.
    pub unsafe fn aligned_realloc_without_lock(
        &mut self,
        ptr: *mut u8,
        alignment: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        if ptr.is_null() {
            return self.aligned_alloc_without_lock(alignment, size, site).map(Some);
        }
        if size == 0 {
            self.tracker
                .raise(&MT004, &format!("{} address={:p}", site, ptr));
            self.free_without_lock(ptr, site);
            return Ok(None);
        }
        self.refuse_released(ptr, "aligned_realloc", site)?;

        let old_size = self.aligned_tracked_size("aligned_realloc", ptr, site)?;

        let moved = self.aligned_untracked("aligned_realloc", alignment, size, site)?;
        ptr::copy_nonoverlapping(ptr, moved.as_ptr(), old_size.min(size));
        self.record_move(ptr, moved.as_ptr(), size, site);
        self.tracker.allocator.free(ptr);
        Ok(Some(moved))
    }

    /// [`AlignedExt::aligned_recalloc`] with the lock already held.
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_realloc_without_lock`](Self::aligned_realloc_without_lock).
    pub unsafe fn aligned_recalloc_without_lock(
        &mut self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        if ptr.is_null() {
            return self
                .aligned_calloc_without_lock(alignment, count, size, site)
                .map(Some);
        }

        let bytes = self.array_size("aligned_recalloc", count, size, site)?;
        let old_size = self.aligned_tracked_size("aligned_recalloc", ptr, site)?;

        let moved = self.aligned_realloc_without_lock(ptr, alignment, bytes, site)?;
        if let Some(block) = moved {
            if bytes > old_size {
                ptr::write_bytes(block.as_ptr().add(old_size), 0, bytes - old_size);
            }
        }
        Ok(moved)
    }

    /// [`AlignedExt::aligned_alloc_array`] with the lock already held.
    pub fn aligned_alloc_array_without_lock(
        &mut self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let bytes = self.array_size("aligned_alloc_array", count, size, site)?;
        self.aligned_alloc_without_lock(alignment, bytes, site)
    }

    /// [`AlignedExt::aligned_realloc_array`] with the lock already held.
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_realloc_without_lock`](Self::aligned_realloc_without_lock).
    pub unsafe fn aligned_realloc_array_without_lock(
        &mut self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        let bytes = self.array_size("aligned_realloc_array", count, size, site)?;
        self.aligned_realloc_without_lock(ptr, alignment, bytes, site)
    }
}

/// Aligned allocation on a [`Tracker`].
///
/// Each method takes the tracker lock for the whole operation.
pub trait AlignedExt {
    /// Allocate `size` bytes aligned to `alignment`.
    fn aligned_alloc(&self, alignment: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError>;

    /// Allocate `count * size` zeroed bytes aligned to `alignment`.
    fn aligned_calloc(
        &self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError>;

    /// Move an aligned block to a new `size`-byte aligned block.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live aligned block from this tracker. On
    /// success it must no longer be used.
    unsafe fn aligned_realloc(
        &self,
        ptr: *mut u8,
        alignment: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError>;

    /// Like [`aligned_realloc`](Self::aligned_realloc) to `count * size`
    /// bytes, zeroing the new tail.
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_realloc`](Self::aligned_realloc).
    unsafe fn aligned_recalloc(
        &self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError>;

    /// Aligned allocation of `count * size` bytes.
    fn aligned_alloc_array(
        &self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError>;

    /// Same as [`aligned_calloc`](Self::aligned_calloc).
    fn aligned_calloc_array(
        &self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.aligned_calloc(alignment, count, size, site)
    }

    /// Aligned resize to `count * size` bytes.
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_realloc`](Self::aligned_realloc).
    unsafe fn aligned_realloc_array(
        &self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError>;

    /// Same as [`aligned_recalloc`](Self::aligned_recalloc).
    ///
    /// # Safety
    ///
    /// Same contract as [`aligned_realloc`](Self::aligned_realloc).
    unsafe fn aligned_recalloc_array(
        &self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.aligned_recalloc(ptr, alignment, count, size, site)
    }
}

impl<M: Metadata, L: RawLock, A: SystemAllocator> AlignedExt for Tracker<M, L, A> {
    fn aligned_alloc(&self, alignment: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().aligned_alloc_without_lock(alignment, size, site)
    }

    fn aligned_calloc(
        &self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.lock()
            .aligned_calloc_without_lock(alignment, count, size, site)
    }

    unsafe fn aligned_realloc(
        &self,
        ptr: *mut u8,
        alignment: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock()
            .aligned_realloc_without_lock(ptr, alignment, size, site)
    }

    unsafe fn aligned_recalloc(
        &self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock()
            .aligned_recalloc_without_lock(ptr, alignment, count, size, site)
    }

    fn aligned_alloc_array(
        &self,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.lock()
            .aligned_alloc_array_without_lock(alignment, count, size, site)
    }

    unsafe fn aligned_realloc_array(
        &self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        self.lock()
            .aligned_realloc_array_without_lock(ptr, alignment, count, size, site)
    }
}
