//! N-dimensional arrays in a single block.
//!
//! A `d`-dimensional array with extents `[e0, e1, .., e(d-1)]` is laid out
//! as one allocation: first the pointer tables for every level except the
//! last (`e0` pointers, then `e0*e1`, ...), then the element data. Indexing
//! the returned block as `***T` (for `d == 3`) walks the tables down to a
//! row of elements. A one-dimensional array is just the data.
//!
//! The whole block is tracked under its base address with the full
//! footprint, so it is released with a single `free`.

use std::ptr::{self, NonNull};

use crate::allocators::SystemAllocator;
use crate::api::error::TrackError;
use crate::api::guard::TrackerGuard;
use crate::api::tracker::Tracker;
use crate::core::entry::{Metadata, Site};
use crate::diagnostics::{MT001, MT003, MT403};
use crate::sync::lock::RawLock;
use crate::util::layout::{checked_align_up, PTR_SIZE};

/// Byte layout of an N-dimensional block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdLayout {
    /// Number of pointers across all table levels.
    pub pointer_count: usize,
    /// Offset of the element data from the block start.
    pub data_offset: usize,
    /// Number of elements.
    pub element_count: usize,
    /// Total bytes of the block.
    pub total_bytes: usize,
}

/// Compute the footprint of an array with `extents` of `elem_size` elements.
///
/// Every multiplication and addition is checked. The pointer tables are
/// rounded up to a multiple of `elem_size` when elements are wider than a
/// pointer, so the data stays aligned.
pub fn nd_array_footprint(extents: &[usize], elem_size: usize) -> Result<NdLayout, TrackError> {
    if elem_size == 0 {
        return Err(TrackError::ZeroSize);
    }
    if extents.is_empty() {
        return Err(TrackError::EmptyExtent { dimension: 0 });
    }

    let last = extents.len() - 1;
    let mut element_count: usize = 1;
    let mut pointer_count: usize = 0;
    for (dimension, &extent) in extents.iter().enumerate() {
        if extent == 0 {
            return Err(TrackError::EmptyExtent { dimension });
        }
        element_count = element_count
            .checked_mul(extent)
            .ok_or(TrackError::SizeOverflow)?;
        if dimension < last {
            pointer_count = pointer_count
                .checked_add(element_count)
                .ok_or(TrackError::SizeOverflow)?;
        }
    }

    let mut data_offset = pointer_count
        .checked_mul(PTR_SIZE)
        .ok_or(TrackError::SizeOverflow)?;
    if elem_size > PTR_SIZE {
        data_offset = checked_align_up(data_offset, elem_size).ok_or(TrackError::SizeOverflow)?;
    }

    let data_bytes = element_count
        .checked_mul(elem_size)
        .ok_or(TrackError::SizeOverflow)?;
    let total_bytes = data_offset
        .checked_add(data_bytes)
        .ok_or(TrackError::SizeOverflow)?;

    Ok(NdLayout {
        pointer_count,
        data_offset,
        element_count,
        total_bytes,
    })
}

/// Fill the pointer tables of a block laid out by `layout`.
///
/// # Safety
///
/// `base` must point to at least `layout.total_bytes` writable bytes,
/// aligned for pointers.
unsafe fn link_tables(base: *mut u8, extents: &[usize], elem_size: usize, layout: &NdLayout) {
    let tables = base as *mut *mut u8;
    let data = base.add(layout.data_offset);
    let last_table = extents.len().saturating_sub(2);

    // Start index of the current level's table and its pointer count.
    let mut level_start = 0usize;
    let mut level_len = extents[0];
    for level in 0..extents.len().saturating_sub(1) {
        let child_extent = extents[level + 1];
        let next_start = level_start + level_len;
        for i in 0..level_len {
            let target = if level == last_table {
                data.add(i * child_extent * elem_size)
            } else {
                tables.add(next_start + i * child_extent) as *mut u8
            };
            *tables.add(level_start + i) = target;
        }
        level_start = next_start;
        level_len *= child_extent;
    }
}

impl<'a, M: Metadata, L: RawLock, A: SystemAllocator> TrackerGuard<'a, M, L, A> {
    fn nd_array(
        &mut self,
        operation: &'static str,
        extents: &[usize],
        elem_size: usize,
        zeroed: bool,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let layout = match nd_array_footprint(extents, elem_size) {
            Ok(layout) => layout,
            Err(error) => {
                let diag = match error {
                    TrackError::ZeroSize => &MT001,
                    TrackError::EmptyExtent { .. } => &MT403,
                    _ => &MT003,
                };
                let context = format!("{} extents={:?} elem_size={}", site, extents, elem_size);
                return Err(self.tracker.fail(operation, diag, error, &context));
            }
        };

        let allocator = &self.tracker.allocator;
        let raw = if zeroed {
            allocator.calloc(1, layout.total_bytes)
        } else {
            allocator.malloc(layout.total_bytes)
        };
        let block = NonNull::new(raw)
            .ok_or_else(|| self.allocation_failed(operation, layout.total_bytes, site))?;

        // SAFETY: the block holds `total_bytes` bytes and the system
        // allocator aligns it for pointers.
        unsafe { link_tables(block.as_ptr(), extents, elem_size, &layout) };

        let _ = self.entry_add(block.as_ptr(), layout.total_bytes, site);
        Ok(block)
    }

    /// [`NdArrayExt::alloc_nd_array`] with the lock already held.
    pub fn alloc_nd_array_without_lock(
        &mut self,
        extents: &[usize],
        elem_size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.nd_array("alloc_nd_array", extents, elem_size, false, site)
    }

    /// [`NdArrayExt::calloc_nd_array`] with the lock already held.
    pub fn calloc_nd_array_without_lock(
        &mut self,
        extents: &[usize],
        elem_size: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        self.nd_array("calloc_nd_array", extents, elem_size, true, site)
    }
}

/// N-dimensional arrays on a [`Tracker`].
pub trait NdArrayExt {
    /// Allocate an array with the given extents. Element data is
    /// uninitialized.
    fn alloc_nd_array(&self, extents: &[usize], elem_size: usize, site: Site) -> Result<NonNull<u8>, TrackError>;

    /// Allocate an array with zeroed element data.
    fn calloc_nd_array(&self, extents: &[usize], elem_size: usize, site: Site) -> Result<NonNull<u8>, TrackError>;

    /// Release an array.
    ///
    /// # Safety
    ///
    /// `array` must be null or a block returned by this tracker.
    unsafe fn free_nd_array(&self, array: *mut u8, site: Site);
}

impl<M: Metadata, L: RawLock, A: SystemAllocator> NdArrayExt for Tracker<M, L, A> {
    fn alloc_nd_array(&self, extents: &[usize], elem_size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().alloc_nd_array_without_lock(extents, elem_size, site)
    }

    fn calloc_nd_array(&self, extents: &[usize], elem_size: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().calloc_nd_array_without_lock(extents, elem_size, site)
    }

    unsafe fn free_nd_array(&self, array: *mut u8, site: Site) {
        self.free(array, site)
    }
}

/// Read element `index` of a two-dimensional array of `T`.
///
/// # Safety
///
/// `array` must be a live two-dimensional block of `T` and `index` in
/// bounds.
pub unsafe fn read_2d<T: Copy>(array: NonNull<u8>, index: [usize; 2]) -> T {
    let rows = array.as_ptr() as *const *const T;
    ptr::read((*rows.add(index[0])).add(index[1]))
}
