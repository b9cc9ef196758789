//! # memtrack
//!
//! Debug-mode allocation tracking in front of the C heap.
//!
//! ## Features
//!
//! - Every live block recorded by address with its size
//! - Call-site provenance for allocations, resizes and releases (`debug`)
//! - Double-release and unmatched-release detection
//! - Leak report and forced release at process exit
//! - One coarse lock, with composable `*_without_lock` operations
//! - Aligned, N-dimensional and string-duplication adapters
//! - Validated, untracked passthrough for production builds (`disable`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memtrack::site;
//!
//! let block = memtrack::malloc(64, site!()).unwrap();
//!
//! let block = unsafe { memtrack::realloc(block.as_ptr(), 128, site!()) }
//!     .unwrap()
//!     .unwrap();
//! unsafe { memtrack::free(block.as_ptr(), site!()) };
//! # memtrack::report_all();
//! ```
//!
//! ## Isolated trackers
//!
//! The crate-root functions share one process-wide [`Tracker`]. Tests and
//! embedders can build their own instead:
//!
//! ```rust
//! use memtrack::{site, Detailed, Tracker, TrackError};
//!
//! let tracker = Tracker::<Detailed>::new();
//! let block = tracker.malloc(32, site!()).unwrap();
//! unsafe {
//!     tracker.free(block.as_ptr(), site!());
//!     // Refused: the entry is still in the table, marked released.
//!     tracker.free(block.as_ptr(), site!());
//! }
//! assert!(matches!(
//!     tracker.last_error().map(|e| e.error),
//!     Some(TrackError::AlreadyReleased { .. })
//! ));
//! ```

pub mod api;
pub mod diagnostics;
pub mod ext;

mod allocators;
mod core;
mod sync;
mod util;

// Tracker service object
pub use api::config::TrackerConfig;
pub use api::error::{ErrorClass, LastError, TrackError};
pub use api::guard::TrackerGuard;
pub use api::passthrough;
pub use api::report::ShutdownReport;
pub use api::stats::TrackerStats;
pub use api::tracker::Tracker;

// Crate-root functions over the process-wide tracker
pub use api::process::*;
#[cfg(not(feature = "disable"))]
pub use crate::core::global::{exit_hook_registered, global};

// Entries and the table contract
pub use crate::core::entry::{DefaultMetadata, Detailed, Entry, Lean, Metadata, ReleaseAction, Site};
pub use crate::core::table::EntryMap;

// Lock backends
pub use sync::lock::{DefaultLock, LazyRawLock, OsLock, RawLock, SpinLock};
#[cfg(feature = "parking_lot")]
pub use sync::lock::ParkingLock;

// System allocator seam
pub use allocators::{LibcAllocator, SystemAllocator};

// Extension adapters
pub use ext::{nd_array_footprint, AlignedExt, NdArrayExt, StrndupExt};

// Diagnostics - Core types and predefined codes
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
pub use diagnostics::{set_strict_mode, StrictMode, StrictModeGuard};
