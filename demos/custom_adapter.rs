//! Custom adapter example for memtrack
//!
//! Builds a "boxed array with a length header" allocator on top of the
//! tracker's entry primitives, the same way the aligned, N-dimensional and
//! strndup adapters are built.
//!
//! Run with: cargo run --example custom_adapter

use std::mem::size_of;
use std::ptr::NonNull;

use memtrack::{
    site, Lean, RawLock, Site, SystemAllocator, TrackError, Tracker, TrackerGuard,
};

/// Allocate `len` u32 slots behind a `usize` length header.
///
/// The tracked block is the whole allocation; the caller gets a pointer to
/// the first slot.
fn alloc_counted<M: memtrack::Metadata, L: RawLock, A: SystemAllocator>(
    guard: &mut TrackerGuard<'_, M, L, A>,
    len: usize,
    site: Site,
) -> Result<NonNull<u32>, TrackError> {
    let total = len
        .checked_mul(size_of::<u32>())
        .and_then(|bytes| bytes.checked_add(size_of::<usize>()))
        .ok_or(TrackError::SizeOverflow)?;

    let base = guard.allocator().malloc(total);
    if base.is_null() {
        return Err(TrackError::AllocationFailed { size: total });
    }
    guard.entry_add(base, total, site)?;

    unsafe {
        (base as *mut usize).write(len);
        Ok(NonNull::new_unchecked(base.add(size_of::<usize>()) as *mut u32))
    }
}

/// Release a block from [`alloc_counted`].
unsafe fn free_counted<M: memtrack::Metadata, L: RawLock, A: SystemAllocator>(
    guard: &mut TrackerGuard<'_, M, L, A>,
    slots: NonNull<u32>,
    site: Site,
) {
    let base = (slots.as_ptr() as *mut u8).sub(size_of::<usize>());
    if guard.entry_free(base, site).is_ok() {
        guard.allocator().free(base);
    }
}

fn main() {
    let tracker = Tracker::<Lean>::new();

    // Several steps under one lock acquisition
    let slots = {
        let mut guard = tracker.lock();
        let slots = alloc_counted(&mut guard, 10, site!()).expect("alloc_counted");
        for i in 0..10 {
            unsafe { slots.as_ptr().add(i).write(i as u32 * 3) };
        }
        println!("Tracked entries while locked: {}", guard.len());
        slots
    };

    let values: Vec<u32> = (0..10).map(|i| unsafe { *slots.as_ptr().add(i) }).collect();
    println!("Values: {:?}", values);
    tracker.report_all();

    {
        let mut guard = tracker.lock();
        unsafe { free_counted(&mut guard, slots, site!()) };
    }
    println!("Tracked entries after release: {}", tracker.len());
}
