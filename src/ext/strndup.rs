//! Bounded string duplication.

use std::ptr::{self, NonNull};

use crate::allocators::SystemAllocator;
use crate::api::error::TrackError;
use crate::api::guard::TrackerGuard;
use crate::api::tracker::Tracker;
use crate::core::entry::{Metadata, Site};
use crate::sync::lock::RawLock;

/// Length of the copy `strndup` makes: up to `max_bytes`, stopping at the
/// first NUL.
pub fn bounded_len(bytes: &[u8], max_bytes: usize) -> usize {
    let window = &bytes[..bytes.len().min(max_bytes)];
    window.iter().position(|&b| b == 0).unwrap_or(window.len())
}

impl<'a, M: Metadata, L: RawLock, A: SystemAllocator> TrackerGuard<'a, M, L, A> {
    /// [`StrndupExt::strndup`] with the lock already held.
    pub fn strndup_without_lock(
        &mut self,
        bytes: &[u8],
        max_bytes: usize,
        site: Site,
    ) -> Result<NonNull<u8>, TrackError> {
        let len = bounded_len(bytes, max_bytes);
        let total = len.checked_add(1).ok_or(TrackError::SizeOverflow)?;

        let copy = NonNull::new(self.tracker.allocator.malloc(total))
            .ok_or_else(|| self.allocation_failed("strndup", total, site))?;
        // SAFETY: `copy` holds `len + 1` bytes and `bytes` at least `len`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), copy.as_ptr(), len);
            *copy.as_ptr().add(len) = 0;
        }

        let _ = self.entry_add(copy.as_ptr(), len, site);
        Ok(copy)
    }
}

/// Bounded string duplication on a [`Tracker`].
pub trait StrndupExt {
    /// Copy at most `max_bytes` of `bytes`, stopping at the first NUL, into a
    /// fresh NUL-terminated block.
    ///
    /// The block is tracked with the string length, terminator excluded.
    /// Release it with [`Tracker::free`].
    fn strndup(&self, bytes: &[u8], max_bytes: usize, site: Site) -> Result<NonNull<u8>, TrackError>;
}

impl<M: Metadata, L: RawLock, A: SystemAllocator> StrndupExt for Tracker<M, L, A> {
    fn strndup(&self, bytes: &[u8], max_bytes: usize, site: Site) -> Result<NonNull<u8>, TrackError> {
        self.lock().strndup_without_lock(bytes, max_bytes, site)
    }
}
