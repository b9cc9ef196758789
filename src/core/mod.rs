//! Tracking engine internals.
//!
//! - `entry`: the per-address record and its two metadata variants
//! - `table`: the map contract the tracker consumes
//! - `global`: the process-wide tracker and its exit hook

pub mod entry;
pub mod global;
pub mod table;
