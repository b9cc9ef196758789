//! Crate-root functions over the process-wide tracker.
//!
//! With the `disable` feature these forward to the untracked
//! [`passthrough`](crate::api::passthrough) layer instead; the zero-fill
//! resize family and size queries are not available there, and `lock` and
//! `report_all` do nothing.

#[cfg(not(feature = "disable"))]
mod tracked {
    use std::ptr::NonNull;

    use crate::allocators::LibcAllocator;
    use crate::api::error::{LastError, TrackError};
    use crate::api::guard::TrackerGuard;
    use crate::core::entry::{DefaultMetadata, Site};
    use crate::core::global::global;
    use crate::sync::lock::DefaultLock;

    /// Allocate `size` bytes on the process-wide tracker.
    pub fn malloc(size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        global().malloc(size, site)
    }

    /// Allocate `count * size` zeroed bytes.
    pub fn calloc(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        global().calloc(count, size, site)
    }

    /// Resize a block. `Ok(None)` means the block was released.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this crate.
    pub unsafe fn realloc(ptr: *mut u8, size: usize, site: Site) -> Result<Option<NonNull<u8>>, TrackError> {
        global().realloc(ptr, size, site)
    }

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a block from this crate.
    pub unsafe fn free(ptr: *mut u8, site: Site) {
        global().free(ptr, site)
    }

    /// Resize to `size` bytes, zeroing the new tail.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`].
    pub unsafe fn recalloc(ptr: *mut u8, size: usize, site: Site) -> Result<Option<NonNull<u8>>, TrackError> {
        global().recalloc(ptr, size, site)
    }

    /// Allocate `count * size` bytes.
    pub fn malloc_array(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        global().malloc_array(count, size, site)
    }

    /// Zeroed array allocation.
    pub fn calloc_array(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        global().calloc_array(count, size, site)
    }

    /// Resize to `count * size` bytes.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`].
    pub unsafe fn realloc_array(
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        global().realloc_array(ptr, count, size, site)
    }

    /// Resize to `count * size` bytes, zeroing the new tail.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`].
    pub unsafe fn recalloc_array(
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: Site,
    ) -> Result<Option<NonNull<u8>>, TrackError> {
        global().recalloc_array(ptr, count, size, site)
    }

    /// Tracked size of `ptr`, or 0.
    pub fn get_size(ptr: *const u8, site: Site) -> usize {
        global().get_size(ptr, site)
    }

    /// Print every tracked entry to stdout.
    pub fn report_all() {
        global().report_all()
    }

    /// Lock the process-wide tracker.
    pub fn lock() -> TrackerGuard<'static, DefaultMetadata, DefaultLock, LibcAllocator> {
        global().lock()
    }

    /// The last failure recorded by the process-wide tracker.
    pub fn last_error() -> Option<LastError> {
        global().last_error()
    }

    /// Forget the recorded failure.
    pub fn clear_last_error() {
        global().clear_last_error()
    }
}

#[cfg(feature = "disable")]
mod tracked {
    use crate::api::error::LastError;

    pub use crate::api::passthrough::{
        calloc, calloc_array, free, malloc, malloc_array, realloc, realloc_array,
    };

    /// Tracking is disabled; nothing to report.
    pub fn report_all() {}

    /// Tracking is disabled; there is no lock.
    pub fn lock() {}

    /// Tracking is disabled; no failures are recorded.
    pub fn last_error() -> Option<LastError> {
        None
    }

    /// Tracking is disabled; no failures are recorded.
    pub fn clear_last_error() {}
}

pub use tracked::*;
