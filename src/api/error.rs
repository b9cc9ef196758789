//! Tracker errors and the last-failure marker.

use std::fmt;

use crate::core::entry::Site;

/// Errors surfaced by tracker operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    /// A zero-byte request.
    ZeroSize,
    /// A zero element count.
    ZeroCount,
    /// `count * size` does not fit in `usize`.
    SizeOverflow,
    /// The system allocator returned no memory.
    AllocationFailed {
        /// Requested size in bytes.
        size: usize,
    },
    /// A null pointer where a block was required.
    NullPointer,
    /// The address has no entry in the table.
    Untracked {
        /// The address looked up.
        address: usize,
    },
    /// The entry is already marked released.
    AlreadyReleased {
        /// The address released twice.
        address: usize,
        /// Where the first release happened.
        previous: Option<Site>,
    },
    /// The table could not grow to hold a new entry.
    InsertFailed {
        /// The block left untracked.
        address: usize,
    },
    /// Alignment is not a power of two or is smaller than a pointer.
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },
    /// Aligned size is smaller than, or not a multiple of, the alignment.
    SizeNotMultiple {
        /// The rejected size.
        size: usize,
        /// The alignment it had to match.
        alignment: usize,
    },
    /// An N-dimensional request with no dimensions or a zero extent.
    EmptyExtent {
        /// Index of the offending dimension.
        dimension: usize,
    },
    /// The tracker has been shut down.
    TableUnavailable,
}

/// Broad failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any allocator call.
    InvalidArgument,
    /// The system allocator had no memory.
    AllocatorFailure,
    /// The table and the caller disagree about an address.
    TrackingDesync,
    /// Tracking cannot continue.
    Fatal,
}

impl TrackError {
    /// The failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            TrackError::ZeroSize
            | TrackError::ZeroCount
            | TrackError::SizeOverflow
            | TrackError::NullPointer
            | TrackError::InvalidAlignment { .. }
            | TrackError::SizeNotMultiple { .. }
            | TrackError::EmptyExtent { .. } => ErrorClass::InvalidArgument,
            TrackError::AllocationFailed { .. } | TrackError::InsertFailed { .. } => {
                ErrorClass::AllocatorFailure
            }
            TrackError::Untracked { .. } | TrackError::AlreadyReleased { .. } => {
                ErrorClass::TrackingDesync
            }
            TrackError::TableUnavailable => ErrorClass::Fatal,
        }
    }

    /// OS-style error code for this error.
    pub fn errno(&self) -> i32 {
        match self.class() {
            ErrorClass::InvalidArgument => libc::EINVAL,
            ErrorClass::AllocatorFailure => libc::ENOMEM,
            ErrorClass::TrackingDesync | ErrorClass::Fatal => libc::EFAULT,
        }
    }
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::ZeroSize => write!(f, "size is zero"),
            TrackError::ZeroCount => write!(f, "count is zero"),
            TrackError::SizeOverflow => write!(f, "count * size overflows usize"),
            TrackError::AllocationFailed { size } => {
                write!(f, "system allocator failed to provide {} bytes", size)
            }
            TrackError::NullPointer => write!(f, "pointer is null"),
            TrackError::Untracked { address } => write!(f, "no entry for address {:#x}", address),
            TrackError::AlreadyReleased { address, previous } => match previous {
                Some(site) => write!(f, "address {:#x} already freed at {}", address, site),
                None => write!(f, "address {:#x} already freed", address),
            },
            TrackError::InsertFailed { address } => {
                write!(f, "failed to add entry for address {:#x}", address)
            }
            TrackError::InvalidAlignment { alignment } => {
                write!(f, "invalid alignment {}", alignment)
            }
            TrackError::SizeNotMultiple { size, alignment } => write!(
                f,
                "size {} is not a non-zero multiple of alignment {}",
                size, alignment
            ),
            TrackError::EmptyExtent { dimension } => {
                write!(f, "array extent {} is zero", dimension)
            }
            TrackError::TableUnavailable => write!(f, "tracking table is not available"),
        }
    }
}

impl std::error::Error for TrackError {}

/// The last operation that failed on a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastError {
    /// Name of the failing operation, e.g. `"realloc"`.
    pub operation: &'static str,
    /// What went wrong.
    pub error: TrackError,
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.error)
    }
}
