//! Allocation backends.
//!
//! **This is the only module that calls into the C heap directly.**

pub mod system;

pub use system::{LibcAllocator, SystemAllocator};
