//! Public API for memtrack.
//!
//! This module contains all user-facing types and functions.
//! Most users should only interact with [`Tracker`](tracker::Tracker) or the
//! crate-root functions over the process-wide tracker.

pub mod config;
pub mod error;
pub mod guard;
pub mod passthrough;
pub mod process;
pub mod report;
pub mod stats;
pub mod tracker;
