//! System allocator seam.
//!
//! The tracker never provisions memory itself. Every byte comes from a
//! [`SystemAllocator`], which is `libc` in production and a counting double
//! in tests.

use std::ptr;

/// The primitive heap operations the tracker delegates to.
///
/// Pointers are raw: a null return means the allocator had no memory.
///
/// # Safety
///
/// Implementations must return either null or a block of at least the
/// requested size that stays valid until it is passed to `free` or `realloc`.
/// `calloc` must return zeroed memory. `aligned_alloc` blocks must be
/// releasable through `free` of the same allocator.
pub unsafe trait SystemAllocator: Send + Sync + 'static {
    /// Allocate `size` uninitialized bytes.
    fn malloc(&self, size: usize) -> *mut u8;

    /// Allocate `count * size` zeroed bytes.
    fn calloc(&self, count: usize, size: usize) -> *mut u8;

    /// Resize a block, possibly moving it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this allocator. On success
    /// the old pointer is invalidated.
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this allocator.
    unsafe fn free(&self, ptr: *mut u8);

    /// Allocate `size` bytes aligned to `alignment`.
    ///
    /// `alignment` is a power of two no smaller than a pointer.
    fn aligned_alloc(&self, alignment: usize, size: usize) -> *mut u8;
}

/// The C library heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcAllocator;

unsafe impl SystemAllocator for LibcAllocator {
    #[inline]
    fn malloc(&self, size: usize) -> *mut u8 {
        // SAFETY: malloc has no preconditions.
        unsafe { libc::malloc(size) as *mut u8 }
    }

    #[inline]
    fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        // SAFETY: calloc checks the product itself.
        unsafe { libc::calloc(count, size) as *mut u8 }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        libc::realloc(ptr as *mut libc::c_void, size) as *mut u8
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        libc::free(ptr as *mut libc::c_void)
    }

    #[cfg(unix)]
    fn aligned_alloc(&self, alignment: usize, size: usize) -> *mut u8 {
        let mut out: *mut libc::c_void = ptr::null_mut();
        // SAFETY: out is a valid location for the result.
        let rc = unsafe { libc::posix_memalign(&mut out, alignment, size) };
        if rc == 0 {
            out as *mut u8
        } else {
            ptr::null_mut()
        }
    }

    // The CRT's aligned blocks need _aligned_free, which `free` cannot
    // honour, so aligned requests are refused.
    #[cfg(not(unix))]
    fn aligned_alloc(&self, _alignment: usize, _size: usize) -> *mut u8 {
        ptr::null_mut()
    }
}
