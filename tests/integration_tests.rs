//! Integration tests for memtrack.

use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use memtrack::ext::nd_array::read_2d;
use memtrack::{
    nd_array_footprint, site, AlignedExt, CollectingSink, DefaultLock, Detailed, ErrorClass, Lean,
    LibcAllocator, Metadata, NdArrayExt, OsLock, Site, SpinLock, StrictModeGuard, StrndupExt,
    SystemAllocator, TrackError, Tracker, TrackerConfig,
};

// ============ TEST DOUBLE ============

/// A libc-backed allocator that counts every call.
///
/// `realloc` always moves the block. With `keep_freed`, `free` is recorded
/// but the memory is never returned, so addresses are never reused and a
/// second release of the same pointer is harmless.
#[derive(Default)]
struct CountingAllocator {
    keep_freed: bool,
    mallocs: AtomicUsize,
    callocs: AtomicUsize,
    reallocs: AtomicUsize,
    frees: AtomicUsize,
    aligned: AtomicUsize,
    sizes: Mutex<HashMap<usize, usize>>,
}

impl CountingAllocator {
    fn keeping_freed() -> Self {
        Self {
            keep_freed: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.mallocs.load(Ordering::SeqCst)
            + self.callocs.load(Ordering::SeqCst)
            + self.reallocs.load(Ordering::SeqCst)
            + self.frees.load(Ordering::SeqCst)
            + self.aligned.load(Ordering::SeqCst)
    }

    fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    fn record(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if !ptr.is_null() {
            self.sizes.lock().unwrap().insert(ptr as usize, size);
        }
        ptr
    }

    unsafe fn release(&self, ptr: *mut u8) {
        self.sizes.lock().unwrap().remove(&(ptr as usize));
        if !self.keep_freed {
            LibcAllocator.free(ptr);
        }
    }
}

unsafe impl SystemAllocator for CountingAllocator {
    fn malloc(&self, size: usize) -> *mut u8 {
        self.mallocs.fetch_add(1, Ordering::SeqCst);
        self.record(LibcAllocator.malloc(size), size)
    }

    fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        self.callocs.fetch_add(1, Ordering::SeqCst);
        self.record(LibcAllocator.calloc(count, size), count * size)
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::SeqCst);
        let old_size = self.sizes.lock().unwrap().get(&(ptr as usize)).copied();
        let moved = self.record(LibcAllocator.malloc(size), size);
        if moved.is_null() {
            return moved;
        }
        if let Some(old_size) = old_size {
            ptr::copy_nonoverlapping(ptr, moved, old_size.min(size));
        }
        self.release(ptr);
        moved
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        self.frees.fetch_add(1, Ordering::SeqCst);
        self.release(ptr);
    }

    fn aligned_alloc(&self, alignment: usize, size: usize) -> *mut u8 {
        self.aligned.fetch_add(1, Ordering::SeqCst);
        self.record(LibcAllocator.aligned_alloc(alignment, size), size)
    }
}

type Counted<M> = Tracker<M, DefaultLock, CountingAllocator>;

fn counted<M: Metadata>() -> Counted<M> {
    Tracker::with_allocator(TrackerConfig::default(), CountingAllocator::keeping_freed())
}

fn counted_with_sink<M: Metadata>(sink: &Arc<CollectingSink>) -> Counted<M> {
    Tracker::with_allocator(
        TrackerConfig::default().with_sink(sink.clone()),
        CountingAllocator::keeping_freed(),
    )
}

const A: Site = Site::new("app.rs", 10);
const B: Site = Site::new("app.rs", 20);
const C: Site = Site::new("app.rs", 30);
const D: Site = Site::new("app.rs", 40);

// ============ SIZE AND RESIZE ============

fn check_allocate_then_size<M: Metadata>() {
    let tracker = counted::<M>();
    for size in [1usize, 7, 64, 4096] {
        let block = tracker.malloc(size, A).unwrap();
        assert_eq!(tracker.get_size(block.as_ptr(), B), size);
    }
    assert_eq!(tracker.len(), 4);
}

#[test]
fn test_allocate_then_size_lean() {
    check_allocate_then_size::<Lean>();
}

#[test]
fn test_allocate_then_size_detailed() {
    check_allocate_then_size::<Detailed>();
}

fn check_resize_moves_entry<M: Metadata>() {
    let tracker = counted::<M>();
    let block = tracker.malloc(64, A).unwrap();
    unsafe { ptr::write_bytes(block.as_ptr(), 0x5A, 64) };

    let moved = unsafe { tracker.realloc(block.as_ptr(), 128, B) }
        .unwrap()
        .unwrap();
    assert_ne!(moved, block);
    assert_eq!(tracker.get_size(moved.as_ptr(), C), 128);
    assert_eq!(tracker.get_size(block.as_ptr(), C), 0);
    assert_eq!(tracker.len(), 1);

    let copied = unsafe { std::slice::from_raw_parts(moved.as_ptr(), 64) };
    assert!(copied.iter().all(|&b| b == 0x5A));
}

#[test]
fn test_resize_moves_entry_lean() {
    check_resize_moves_entry::<Lean>();
}

#[test]
fn test_resize_moves_entry_detailed() {
    check_resize_moves_entry::<Detailed>();
}

#[test]
fn test_resize_keeps_allocation_site() {
    let tracker = counted::<Detailed>();
    let block = tracker.malloc(16, A).unwrap();
    let moved = unsafe { tracker.realloc(block.as_ptr(), 32, B) }
        .unwrap()
        .unwrap();

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.len(), 1);
    let entry = &snapshot[0];
    assert_eq!(entry.address, moved.as_ptr() as usize);
    assert_eq!(entry.meta.allocation_site, A);
    assert_eq!(entry.meta.last_resize_site, Some(B));
    assert_eq!(entry.meta.release_site, None);
}

#[test]
fn test_realloc_null_is_allocate() {
    let tracker = counted::<Lean>();
    let block = unsafe { tracker.realloc(ptr::null_mut(), 24, A) }
        .unwrap()
        .unwrap();
    assert_eq!(tracker.get_size(block.as_ptr(), B), 24);
}

#[test]
fn test_realloc_to_zero_releases() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);
    let block = tracker.malloc(32, A).unwrap();

    let result = unsafe { tracker.realloc(block.as_ptr(), 0, B) };
    assert_eq!(result, Ok(None));
    assert_eq!(tracker.len(), 0);
    assert_eq!(tracker.allocator().frees(), 1);
    assert_eq!(sink.count("MT004"), 1);
}

// ============ CONCRETE SCENARIOS ============

#[test]
fn test_scenario_detailed_double_release() {
    let tracker = counted::<Detailed>();

    let block = tracker.malloc(64, A).unwrap();
    assert_eq!(tracker.get_size(block.as_ptr(), A), 64);

    let moved = unsafe { tracker.realloc(block.as_ptr(), 128, B) }
        .unwrap()
        .unwrap();
    assert_ne!(moved, block);
    assert_eq!(tracker.get_size(moved.as_ptr(), B), 128);
    assert_eq!(tracker.get_size(block.as_ptr(), B), 0);

    unsafe { tracker.free(moved.as_ptr(), C) };
    assert_eq!(tracker.allocator().frees(), 1);

    unsafe { tracker.free(moved.as_ptr(), D) };
    assert_eq!(tracker.allocator().frees(), 1, "second release reached the system");

    let last = tracker.last_error().unwrap();
    assert_eq!(last.operation, "entry_free");
    assert_eq!(
        last.error,
        TrackError::AlreadyReleased {
            address: moved.as_ptr() as usize,
            previous: Some(C),
        }
    );
    assert_eq!(tracker.stats().double_release_count, 1);
    // The released entry stays in the table, marked.
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_scenario_lean_double_release() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);

    let block = tracker.malloc(64, A).unwrap();
    let moved = unsafe { tracker.realloc(block.as_ptr(), 128, B) }
        .unwrap()
        .unwrap();
    assert_eq!(tracker.get_size(moved.as_ptr(), B), 128);

    unsafe { tracker.free(moved.as_ptr(), C) };
    assert_eq!(tracker.len(), 0);

    // No detection: the entry is gone, so this is an untracked release that
    // is still handed to the system allocator.
    unsafe { tracker.free(moved.as_ptr(), D) };
    assert_eq!(tracker.allocator().frees(), 2);
    assert_eq!(
        tracker.last_error().map(|e| e.error),
        Some(TrackError::Untracked {
            address: moved.as_ptr() as usize
        })
    );
    assert_eq!(sink.count("MT203"), 1);
    assert_eq!(sink.count("MT205"), 0);
}

#[test]
fn test_scenario_allocate_zero() {
    let tracker = counted::<Detailed>();
    assert_eq!(tracker.malloc(0, A), Err(TrackError::ZeroSize));
    assert_eq!(tracker.len(), 0);
    assert_eq!(tracker.allocator().calls(), 0);
    assert_eq!(tracker.last_error().unwrap().operation, "malloc");
}

#[test]
fn test_scenario_leak_at_shutdown() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Detailed>(&sink);

    let leaked = tracker.malloc(48, A).unwrap();
    let released = tracker.malloc(16, B).unwrap();
    unsafe { tracker.free(released.as_ptr(), C) };

    let report = tracker.shutdown();
    assert_eq!(report.leak_count(), 1);
    assert_eq!(report.leaked_bytes(), 48);
    assert_eq!(report.already_released, 1);
    assert_eq!(report.leaked[0].address, leaked.as_ptr() as usize);
    assert_eq!(report.leaked[0].meta.allocation_site, A);

    assert_eq!(sink.count("MT301"), 1);
    let context = sink
        .diagnostics()
        .last()
        .and_then(|collected| collected.context.clone())
        .unwrap();
    assert!(context.contains("allocated at app.rs:10"), "{}", context);

    assert_eq!(tracker.len(), 0);
    assert!(!tracker.is_initialized());
    // The leak was force-released.
    assert_eq!(tracker.allocator().frees(), 2);
}

// ============ SHUTDOWN ============

#[test]
fn test_lean_shutdown_releases_silently() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);
    for _ in 0..3 {
        tracker.malloc(8, A).unwrap();
    }

    let report = tracker.shutdown();
    assert_eq!(report.leak_count(), 3);
    assert_eq!(tracker.allocator().frees(), 3);
    assert_eq!(sink.count("MT301"), 0);
    assert_eq!(tracker.stats().live_entries, 0);
}

#[test]
fn test_shutdown_runs_once() {
    let tracker = counted::<Detailed>();
    tracker.malloc(8, A).unwrap();

    assert_eq!(tracker.shutdown().leak_count(), 1);
    let again = tracker.shutdown();
    assert!(again.is_clean());
    assert_eq!(tracker.allocator().frees(), 1);
}

#[test]
fn test_strict_shutdown_releases_every_leak() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Detailed>(&sink);
    for size in [8usize, 16, 32] {
        tracker.malloc(size, A).unwrap();
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _strict = StrictModeGuard::panic_on_error();
        tracker.shutdown()
    }));
    assert!(outcome.is_err());
    assert_eq!(tracker.allocator().frees(), 3);
    assert_eq!(sink.count("MT301"), 1);
    assert!(!tracker.is_initialized());
    assert_eq!(tracker.stats().live_entries, 0);
}

#[test]
fn test_shutdown_without_leak_reports() {
    let sink = Arc::new(CollectingSink::new());
    let config = TrackerConfig::default()
        .with_sink(sink.clone())
        .with_leak_reports(false);
    let tracker: Counted<Detailed> =
        Tracker::with_allocator(config, CountingAllocator::keeping_freed());
    tracker.malloc(8, A).unwrap();

    assert_eq!(tracker.shutdown().leak_count(), 1);
    assert_eq!(sink.count("MT301"), 0);
}

#[test]
fn test_after_shutdown_allocations_are_untracked() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);
    tracker.shutdown();

    let block = tracker.malloc(32, A).unwrap();
    assert_eq!(tracker.len(), 0);
    assert_eq!(tracker.get_size(block.as_ptr(), B), 0);
    assert!(sink.count("MT902") >= 1);
    assert_eq!(tracker.try_init(), Err(TrackError::TableUnavailable));
    unsafe { tracker.free(block.as_ptr(), C) };
}

#[test]
fn test_try_init() {
    let tracker = Tracker::<Lean>::new();
    assert!(!tracker.is_initialized());
    assert_eq!(tracker.try_init(), Ok(()));
    assert!(tracker.is_initialized());
    assert_eq!(tracker.try_init(), Ok(()));
}

// ============ ARRAY FORMS AND OVERFLOW ============

#[test]
fn test_overflow_rejected_without_allocator_call() {
    let tracker = counted::<Detailed>();
    let block = tracker.malloc(16, A).unwrap();
    let before = tracker.allocator().calls();

    let count = usize::MAX / 8 + 1;
    assert_eq!(tracker.malloc_array(count, 8, B), Err(TrackError::SizeOverflow));
    assert_eq!(tracker.calloc(count, 8, B), Err(TrackError::SizeOverflow));
    assert_eq!(tracker.calloc_array(count, 8, B), Err(TrackError::SizeOverflow));
    unsafe {
        assert_eq!(
            tracker.realloc_array(block.as_ptr(), count, 8, B),
            Err(TrackError::SizeOverflow)
        );
        assert_eq!(
            tracker.recalloc_array(block.as_ptr(), count, 8, B),
            Err(TrackError::SizeOverflow)
        );
    }
    assert_eq!(
        tracker.aligned_alloc_array(64, count, 64, B),
        Err(TrackError::SizeOverflow)
    );
    assert_eq!(
        tracker.alloc_nd_array(&[usize::MAX, 4], 8, B),
        Err(TrackError::SizeOverflow)
    );

    assert_eq!(tracker.allocator().calls(), before);
    assert_eq!(tracker.get_size(block.as_ptr(), C), 16);
}

#[test]
fn test_zero_count_and_size_rejected() {
    let tracker = counted::<Lean>();
    assert_eq!(tracker.calloc(0, 8, A), Err(TrackError::ZeroCount));
    assert_eq!(tracker.calloc(8, 0, A), Err(TrackError::ZeroSize));
    assert_eq!(tracker.malloc_array(0, 8, A), Err(TrackError::ZeroCount));
    assert_eq!(tracker.malloc_array(8, 0, A), Err(TrackError::ZeroSize));
    assert_eq!(tracker.allocator().calls(), 0);
    assert!(tracker.is_empty());

    let last = tracker.last_error().unwrap();
    assert_eq!(last.error.class(), ErrorClass::InvalidArgument);
    assert_eq!(last.error.errno(), libc::EINVAL);
}

#[test]
fn test_calloc_matches_array_allocation() {
    let tracker = counted::<Detailed>();
    let zeroed = tracker.calloc(8, 16, A).unwrap();
    let plain = tracker.malloc_array(8, 16, A).unwrap();

    assert_eq!(tracker.get_size(zeroed.as_ptr(), B), 128);
    assert_eq!(
        tracker.get_size(zeroed.as_ptr(), B),
        tracker.get_size(plain.as_ptr(), B)
    );
    let bytes = unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 128) };
    assert!(bytes.iter().all(|&b| b == 0));

    let entries = tracker.snapshot();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.size == 128 && e.meta.allocation_site == A));
}

#[test]
fn test_realloc_array() {
    let tracker = counted::<Lean>();
    let block = tracker.malloc_array(4, 8, A).unwrap();
    let grown = unsafe { tracker.realloc_array(block.as_ptr(), 16, 8, B) }
        .unwrap()
        .unwrap();
    assert_eq!(tracker.get_size(grown.as_ptr(), C), 128);
}

// ============ ZERO-FILL RESIZE ============

#[test]
fn test_recalloc_zero_fills_new_tail() {
    let tracker = counted::<Detailed>();
    let block = tracker.malloc(16, A).unwrap();
    unsafe { ptr::write_bytes(block.as_ptr(), 0xAA, 16) };

    let grown = unsafe { tracker.recalloc_array(block.as_ptr(), 4, 16, B) }
        .unwrap()
        .unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 64) };
    assert!(bytes[..16].iter().all(|&b| b == 0xAA));
    assert!(bytes[16..].iter().all(|&b| b == 0));
    assert_eq!(tracker.get_size(grown.as_ptr(), C), 64);

    let same = unsafe { tracker.recalloc(grown.as_ptr(), 96, C) }
        .unwrap()
        .unwrap();
    assert_eq!(tracker.get_size(same.as_ptr(), D), 96);
}

#[test]
fn test_recalloc_untracked_falls_back_to_fresh_block() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);
    let foreign = LibcAllocator.malloc(16);
    assert!(!foreign.is_null());

    let fresh = unsafe { tracker.recalloc_array(foreign, 2, 16, A) }
        .unwrap()
        .unwrap();
    assert_ne!(fresh.as_ptr(), foreign);
    assert_eq!(tracker.get_size(fresh.as_ptr(), B), 32);
    let bytes = unsafe { std::slice::from_raw_parts(fresh.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
    assert_eq!(sink.count("MT207"), 1);

    unsafe { LibcAllocator.free(foreign) };
}

#[test]
fn test_recalloc_null_is_zeroed_allocation() {
    let tracker = counted::<Lean>();
    let block = unsafe { tracker.recalloc_array(ptr::null_mut(), 3, 8, A) }
        .unwrap()
        .unwrap();
    assert_eq!(tracker.get_size(block.as_ptr(), B), 24);
}

// ============ DESYNC DIAGNOSTICS ============

#[test]
fn test_untracked_queries_and_releases() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Detailed>(&sink);
    let foreign = tracker.allocator().malloc(8);

    assert_eq!(tracker.get_size(foreign, A), 0);
    assert_eq!(sink.count("MT204"), 1);
    assert_eq!(tracker.get_size(ptr::null(), A), 0);
    assert_eq!(sink.count("MT206"), 1);

    unsafe { tracker.free(foreign, B) };
    assert_eq!(sink.count("MT203"), 1);
    assert_eq!(tracker.allocator().frees(), 1);

    let last = tracker.last_error().unwrap();
    assert_eq!(last.error.class(), ErrorClass::TrackingDesync);
    assert_eq!(last.error.errno(), libc::EFAULT);
    tracker.clear_last_error();
    assert!(tracker.last_error().is_none());

    unsafe { tracker.free(ptr::null_mut(), C) };
    assert!(tracker.last_error().is_none());
}

#[test]
fn test_resize_of_released_block_is_refused() {
    let tracker = counted::<Detailed>();
    let block = tracker.malloc(32, A).unwrap();
    unsafe { tracker.free(block.as_ptr(), B) };

    let before = tracker.allocator().calls();
    let result = unsafe { tracker.realloc(block.as_ptr(), 64, C) };
    assert_eq!(
        result,
        Err(TrackError::AlreadyReleased {
            address: block.as_ptr() as usize,
            previous: Some(B),
        })
    );
    assert_eq!(tracker.allocator().calls(), before);
}

// ============ GUARD COMPOSITION ============

#[test]
fn test_guard_composes_operations() {
    let tracker = counted::<Detailed>();
    let block = {
        let mut guard = tracker.lock();
        let block = guard.malloc_without_lock(16, A).unwrap();
        let size = guard.get_size_without_lock(block.as_ptr(), A);
        let grown = unsafe { guard.realloc_without_lock(block.as_ptr(), size * 2, B) }
            .unwrap()
            .unwrap();
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.entry(grown.as_ptr() as usize).unwrap().size, 32);
        grown
    };

    // The guard released the lock; another thread can take it.
    let tracker = Arc::new(tracker);
    let shared = Arc::clone(&tracker);
    let address = block.as_ptr() as usize;
    let size = thread::spawn(move || shared.get_size(address as *const u8, C))
        .join()
        .unwrap();
    assert_eq!(size, 32);
}

#[test]
fn test_raw_lock_and_assume_locked() {
    let tracker = counted::<Lean>();
    tracker.raw_lock();
    let mut guard = unsafe { tracker.assume_locked() };
    let block = guard.calloc_array_without_lock(4, 4, A).unwrap();
    guard.unlock();

    assert_eq!(tracker.get_size(block.as_ptr(), B), 16);

    tracker.raw_lock();
    unsafe { tracker.raw_unlock() };
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_entry_primitives_for_adapters() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Detailed>(&sink);
    let mut guard = tracker.lock();

    assert_eq!(
        guard.entry_add(ptr::null_mut(), 8, A),
        Err(TrackError::NullPointer)
    );

    let raw = guard.allocator().malloc(8);
    guard.entry_add(raw, 8, A).unwrap();

    let moved = unsafe { guard.allocator().realloc(raw, 24) };
    guard.entry_update(raw, moved, 24, B).unwrap();
    assert!(guard.entry(raw as usize).is_none());
    let entry = guard.entry(moved as usize).unwrap();
    assert_eq!(entry.size, 24);
    assert_eq!(entry.meta.last_resize_site, Some(B));

    // In-place update keeps the address.
    guard.entry_update(moved, moved, 12, C).unwrap();
    assert_eq!(guard.entry(moved as usize).unwrap().size, 12);

    guard.entry_free(moved, D).unwrap();
    assert!(guard.entry(moved as usize).unwrap().is_released());
    assert!(matches!(
        guard.entry_free(moved, D),
        Err(TrackError::AlreadyReleased { .. })
    ));

    let stranger = 0x1000 as *mut u8;
    assert_eq!(
        guard.entry_free(stranger, D),
        Err(TrackError::Untracked { address: 0x1000 })
    );
    drop(guard);

    assert_eq!(sink.count("MT201"), 1);
    assert_eq!(sink.count("MT205"), 1);
    assert_eq!(sink.count("MT203"), 1);
}

#[test]
fn test_entry_update_of_untracked_falls_back_to_add() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Lean>(&sink);
    let mut guard = tracker.lock();

    let raw = guard.allocator().malloc(8);
    guard.entry_update(0x2000 as *mut u8, raw, 8, A).unwrap();
    assert_eq!(guard.entry(raw as usize).unwrap().size, 8);
    assert!(guard.entry(0x2000).is_none());
    drop(guard);

    assert_eq!(sink.count("MT202"), 1);
}

// ============ REPORTS AND STATS ============

#[test]
fn test_detailed_report() {
    let tracker = counted::<Detailed>();
    let live = tracker.malloc(64, A).unwrap();
    let released = tracker.malloc(8, B).unwrap();
    unsafe { tracker.free(released.as_ptr(), C) };

    let mut out = Vec::new();
    tracker.write_report(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("2 tracked entries"), "{}", text);
    assert!(text.contains(&format!("Pointer: {:#x}, Size: 64 bytes", live.as_ptr() as usize)));
    assert!(text.contains("Allocated at app.rs:10"));
    assert!(text.contains("Already Freed"));
    assert!(text.contains("Free at app.rs:30"));
    assert!(!text.contains("note:"));
}

#[test]
fn test_lean_report_notes_missing_detail() {
    let tracker = counted::<Lean>();
    tracker.malloc(64, A).unwrap();

    let mut out = Vec::new();
    tracker.write_report(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("1 tracked entries"));
    assert!(text.contains("64 bytes"));
    assert!(text.contains("note:"));
    assert!(!text.contains("Allocated at"));
}

#[test]
fn test_stats() {
    let tracker = counted::<Detailed>();
    let a = tracker.malloc(100, A).unwrap();
    let b = tracker.malloc(50, A).unwrap();
    let a = unsafe { tracker.realloc(a.as_ptr(), 200, B) }.unwrap().unwrap();
    unsafe {
        tracker.free(b.as_ptr(), C);
        tracker.free(b.as_ptr(), C);
    }

    let stats = tracker.stats();
    assert_eq!(stats.allocation_count, 2);
    assert_eq!(stats.live_entries, 1);
    assert_eq!(stats.released_entries, 1);
    assert_eq!(stats.live_bytes, 200);
    assert_eq!(stats.peak_live_bytes, 250);
    assert_eq!(stats.release_count, 1);
    assert_eq!(stats.double_release_count, 1);
    assert_eq!(stats.table_entries(), tracker.len());

    unsafe { tracker.free(a.as_ptr(), D) };
    assert_eq!(tracker.stats().live_bytes, 0);
    assert!(tracker.stats().to_string().contains("Double releases: 1"));
}

// ============ ADAPTERS ============

#[test]
fn test_aligned_allocation() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = counted_with_sink::<Detailed>(&sink);

    let block = tracker.aligned_alloc(64, 128, A).unwrap();
    assert_eq!(block.as_ptr() as usize % 64, 0);
    assert_eq!(tracker.get_size(block.as_ptr(), A), 128);

    assert_eq!(
        tracker.aligned_alloc(48, 96, A),
        Err(TrackError::InvalidAlignment { alignment: 48 })
    );
    assert_eq!(
        tracker.aligned_alloc(64, 100, A),
        Err(TrackError::SizeNotMultiple {
            size: 100,
            alignment: 64
        })
    );
    assert_eq!(sink.count("MT401"), 1);
    assert_eq!(sink.count("MT402"), 1);

    unsafe { tracker.free(block.as_ptr(), B) };
    assert_eq!(tracker.stats().live_entries, 0);
}

#[test]
fn test_aligned_realloc_moves_and_copies() {
    let tracker = counted::<Lean>();
    let block = tracker.aligned_alloc(32, 64, A).unwrap();
    unsafe { ptr::write_bytes(block.as_ptr(), 0x11, 64) };

    let moved = unsafe { tracker.aligned_realloc(block.as_ptr(), 32, 128, B) }
        .unwrap()
        .unwrap();
    assert_ne!(moved, block);
    assert_eq!(moved.as_ptr() as usize % 32, 0);
    assert_eq!(tracker.get_size(moved.as_ptr(), C), 128);
    assert_eq!(tracker.get_size(block.as_ptr(), C), 0);
    let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0x11));
    assert_eq!(tracker.allocator().frees(), 1);
}

#[test]
fn test_aligned_realloc_untracked_is_an_error() {
    let tracker = counted::<Lean>();
    let foreign = tracker.allocator().aligned_alloc(16, 32);
    let before = tracker.allocator().calls();

    let result = unsafe { tracker.aligned_realloc(foreign, 16, 64, A) };
    assert_eq!(
        result,
        Err(TrackError::Untracked {
            address: foreign as usize
        })
    );
    assert_eq!(tracker.allocator().calls(), before);

    let last = tracker.last_error().unwrap();
    assert_eq!(last.operation, "aligned_realloc");
    assert_eq!(last.error, TrackError::Untracked { address: foreign as usize });

    let result = unsafe { tracker.aligned_recalloc(foreign, 16, 4, 16, A) };
    assert!(result.is_err());
    assert_eq!(tracker.last_error().unwrap().operation, "aligned_recalloc");
}

#[test]
fn test_aligned_recalloc_zero_fills() {
    let tracker = counted::<Detailed>();
    let block = tracker.aligned_calloc(16, 2, 16, A).unwrap();
    unsafe { ptr::write_bytes(block.as_ptr(), 0xFF, 32) };

    let grown = unsafe { tracker.aligned_recalloc(block.as_ptr(), 16, 4, 16, B) }
        .unwrap()
        .unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 64) };
    assert!(bytes[..32].iter().all(|&b| b == 0xFF));
    assert!(bytes[32..].iter().all(|&b| b == 0));
    assert_eq!(tracker.get_size(grown.as_ptr(), C), 64);
}

#[test]
fn test_nd_array() {
    let tracker = counted::<Lean>();
    let extents = [3usize, 4];
    let layout = nd_array_footprint(&extents, 4).unwrap();

    let array = tracker.calloc_nd_array(&extents, 4, A).unwrap();
    assert_eq!(tracker.get_size(array.as_ptr(), B), layout.total_bytes);

    unsafe {
        let rows = array.as_ptr() as *mut *mut u32;
        assert_eq!(read_2d::<u32>(array, [2, 3]), 0);
        *(*rows.add(1)).add(2) = 42;
        assert_eq!(read_2d::<u32>(array, [1, 2]), 42);
        tracker.free_nd_array(array.as_ptr(), C);
    }
    assert!(tracker.is_empty());

    assert_eq!(
        tracker.alloc_nd_array(&[2, 0], 4, D),
        Err(TrackError::EmptyExtent { dimension: 1 })
    );
}

#[test]
fn test_nd_array_three_dimensions() {
    let tracker = counted::<Detailed>();
    let array = tracker.alloc_nd_array(&[2, 3, 4], 8, A).unwrap();
    unsafe {
        let planes = array.as_ptr() as *mut *mut *mut u64;
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    *(*(*planes.add(i)).add(j)).add(k) = (i * 100 + j * 10 + k) as u64;
                }
            }
        }
        assert_eq!(*(*(*planes.add(1)).add(2)).add(3), 123);
        assert_eq!(*(*(*planes.add(0)).add(1)).add(0), 10);
    }
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_strndup() {
    let tracker = counted::<Detailed>();

    let copy = tracker.strndup(b"hello world", 5, A).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(copy.as_ptr(), 6) };
    assert_eq!(bytes, b"hello\0");
    assert_eq!(tracker.get_size(copy.as_ptr(), B), 5);

    let short = tracker.strndup(b"hi\0there", 64, A).unwrap();
    assert_eq!(tracker.get_size(short.as_ptr(), B), 2);

    unsafe {
        tracker.free(copy.as_ptr(), C);
        tracker.free(short.as_ptr(), C);
    }
    assert_eq!(tracker.stats().live_entries, 0);
}

// ============ STRICT MODE ============

#[test]
#[should_panic(expected = "MT003")]
fn test_strict_mode_panics_on_error() {
    let _strict = StrictModeGuard::panic_on_error();
    let tracker = Tracker::<Lean>::new();
    let _ = tracker.calloc(usize::MAX, 2, A);
}

#[test]
fn test_strict_mode_ignores_warnings_on_error_level() {
    let _strict = StrictModeGuard::panic_on_error();
    let tracker = Tracker::<Lean>::new();
    assert_eq!(tracker.malloc(0, A), Err(TrackError::ZeroSize));
}

#[test]
#[should_panic(expected = "MT001")]
fn test_strict_mode_panics_on_warning() {
    let _strict = StrictModeGuard::panic_on_warning();
    let tracker = Tracker::<Lean>::new();
    let _ = tracker.malloc(0, A);
}

#[test]
fn test_strict_panic_releases_lock() {
    let tracker = Tracker::<Lean>::new();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _strict = StrictModeGuard::panic_on_error();
        let _ = tracker.calloc(usize::MAX, 2, A);
    }));
    assert!(outcome.is_err());

    let block = tracker.malloc(8, B).unwrap();
    assert_eq!(tracker.get_size(block.as_ptr(), C), 8);
    unsafe { tracker.free(block.as_ptr(), C) };
}

// ============ LOCK BACKENDS ============

#[test]
fn test_lock_backends() {
    let spin: Tracker<Lean, SpinLock> = Tracker::new();
    let os: Tracker<Lean, OsLock> = Tracker::new();
    assert_eq!(spin.lock_name(), "spin");
    assert_eq!(os.lock_name(), "os");

    for name in [spin.metadata_name(), os.metadata_name()] {
        assert_eq!(name, "lean");
    }

    let a = spin.malloc(8, A).unwrap();
    let b = os.malloc(8, A).unwrap();
    unsafe {
        spin.free(a.as_ptr(), B);
        os.free(b.as_ptr(), B);
    }
    assert!(spin.is_empty() && os.is_empty());
}

// ============ MULTI-THREADED TESTS ============

fn hammer<M: Metadata, L: memtrack::RawLock>(tracker: Arc<Tracker<M, L>>) {
    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let here = Site::new("worker.rs", t);
                for i in 0..200usize {
                    let size = 8 + (i % 32);
                    let block = tracker.malloc(size, here).unwrap();
                    assert_eq!(tracker.get_size(block.as_ptr(), here), size);
                    let grown = unsafe { tracker.realloc(block.as_ptr(), size * 2, here) }
                        .unwrap()
                        .unwrap();
                    assert_eq!(tracker.get_size(grown.as_ptr(), here), size * 2);
                    unsafe { tracker.free(grown.as_ptr(), here) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_multithread_lean() {
    let tracker = Arc::new(Tracker::<Lean, SpinLock>::new());
    hammer(Arc::clone(&tracker));

    assert!(tracker.is_empty());
    let stats = tracker.stats();
    assert_eq!(stats.allocation_count, 1600);
    assert_eq!(stats.release_count, 1600);
    assert_eq!(stats.live_bytes, 0);
}

#[test]
fn test_multithread_detailed() {
    let tracker = Arc::new(Tracker::<Detailed, OsLock>::new());
    hammer(Arc::clone(&tracker));

    let stats = tracker.stats();
    assert_eq!(stats.live_entries, 0);
    assert_eq!(stats.live_bytes, 0);
    assert_eq!(stats.double_release_count, 0);
    assert!(tracker.snapshot().iter().all(|e| e.is_released()));
    assert!(tracker.shutdown().is_clean());
}

// ============ PROCESS-WIDE TRACKER ============

#[cfg(not(feature = "disable"))]
#[test]
fn test_global_functions() {
    let block = memtrack::malloc(40, site!()).unwrap();
    assert_eq!(memtrack::get_size(block.as_ptr(), site!()), 40);
    assert!(memtrack::exit_hook_registered());

    let block = unsafe { memtrack::recalloc(block.as_ptr(), 80, site!()) }
        .unwrap()
        .unwrap();
    assert_eq!(memtrack::get_size(block.as_ptr(), site!()), 80);

    {
        let mut guard = memtrack::lock();
        assert_eq!(guard.get_size_without_lock(block.as_ptr(), site!()), 80);
    }

    unsafe { memtrack::free(block.as_ptr(), site!()) };
    assert!(std::ptr::eq(memtrack::global(), memtrack::global()));
}

#[cfg(feature = "disable")]
#[test]
fn test_disabled_functions_pass_through() {
    assert_eq!(memtrack::malloc(0, site!()), Err(TrackError::ZeroSize));
    let block = memtrack::calloc_array(4, 4, site!()).unwrap();
    unsafe {
        assert_eq!(memtrack::realloc(block.as_ptr(), 0, site!()), Ok(None));
    }
    assert!(memtrack::last_error().is_none());
}
