//! Synchronization primitives.
//!
//! `lock` holds the tracker lock backends (the single lock that serializes
//! every table access); `mutex` is a small data-carrying mutex used for the
//! tracker's side state.

pub mod lock;
pub(crate) mod mutex;
