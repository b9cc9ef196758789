//! Untracked passthrough.
//!
//! The same argument checks as the tracked wrappers, straight onto the C
//! heap, with no table. The crate-root functions use this layer when the
//! `disable` feature is on. There is no zero-fill resize here.

use std::ptr::NonNull;

use crate::allocators::{LibcAllocator, SystemAllocator};
use crate::api::error::TrackError;
use crate::core::entry::Site;
use crate::diagnostics::{emit_with_context, Diagnostic, MT001, MT002, MT003, MT004, MT101};
use crate::util::size::array_bytes;

fn reject(diag: &Diagnostic, error: TrackError, context: String) -> TrackError {
    emit_with_context(diag, &context);
    error
}

fn checked(count: usize, size: usize, site: Site) -> Result<usize, TrackError> {
    let context = || format!("{} count={} size={}", site, count, size);
    if count == 0 {
        return Err(reject(&MT002, TrackError::ZeroCount, context()));
    }
    if size == 0 {
        return Err(reject(&MT001, TrackError::ZeroSize, context()));
    }
    array_bytes(count, size).ok_or_else(|| reject(&MT003, TrackError::SizeOverflow, context()))
}

fn non_null(raw: *mut u8, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
    NonNull::new(raw).ok_or_else(|| {
        reject(
            &MT101,
            TrackError::AllocationFailed { size },
            format!("{} size={}", site, size),
        )
    })
}

/// Allocate `size` bytes.
pub fn malloc(size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
    if size == 0 {
        return Err(reject(&MT001, TrackError::ZeroSize, site.to_string()));
    }
    non_null(LibcAllocator.malloc(size), size, site)
}

/// Allocate `count * size` zeroed bytes.
pub fn calloc(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
    let bytes = checked(count, size, site)?;
    non_null(LibcAllocator.calloc(count, size), bytes, site)
}

/// Resize a block; size zero releases it.
///
/// # Safety
///
/// `ptr` must be null or a live block from the C heap.
pub unsafe fn realloc(ptr: *mut u8, size: usize, site: Site) -> Result<Option<NonNull<u8>>, TrackError> {
    if ptr.is_null() {
        return malloc(size, site).map(Some);
    }
    if size == 0 {
        emit_with_context(&MT004, &format!("{} address={:p}", site, ptr));
        LibcAllocator.free(ptr);
        return Ok(None);
    }
    non_null(LibcAllocator.realloc(ptr, size), size, site).map(Some)
}

/// Release a block.
///
/// # Safety
///
/// `ptr` must be null or a live block from the C heap.
pub unsafe fn free(ptr: *mut u8, _site: Site) {
    LibcAllocator.free(ptr)
}

/// Allocate `count * size` bytes.
pub fn malloc_array(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
    let bytes = checked(count, size, site)?;
    non_null(LibcAllocator.malloc(bytes), bytes, site)
}

/// Same as [`calloc`].
pub fn calloc_array(count: usize, size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
    calloc(count, size, site)
}

/// Resize to `count * size` bytes.
///
/// # Safety
///
/// `ptr` must be null or a live block from the C heap.
pub unsafe fn realloc_array(
    ptr: *mut u8,
    count: usize,
    size: usize,
    site: Site,
) -> Result<Option<NonNull<u8>>, TrackError> {
    let bytes = checked(count, size, site)?;
    realloc(ptr, bytes, site)
}
