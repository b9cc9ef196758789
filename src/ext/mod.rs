//! Extension adapters.
//!
//! Each adapter computes its own byte footprint, gets memory from the
//! system allocator, and records it through the guard's entry primitives.
//! None of them owns table state.

pub mod aligned;
pub mod nd_array;
pub mod strndup;

pub use aligned::AlignedExt;
pub use nd_array::{nd_array_footprint, NdArrayExt, NdLayout};
pub use strndup::StrndupExt;
