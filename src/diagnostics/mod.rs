//! Runtime diagnostics for the tracker.
//!
//! This module provides:
//! - **Coded diagnostics**: every misuse the tracker detects has a stable code
//! - **Emission**: rustc-style lines on stderr, optionally routed through `log`
//! - **Sinks**: per-tracker capture of diagnostics (used by tests)
//! - **Strict mode**: optional panic-on-error for CI
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                              |
//! |-------|--------------------------------------|
//! | MT0xx | Invalid arguments                    |
//! | MT1xx | System allocator failures            |
//! | MT2xx | Tracking desync (untracked, double)  |
//! | MT3xx | Leaks and table maintenance          |
//! | MT4xx | Extension adapter validation         |
//! | MT9xx | Fatal and internal errors            |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memtrack::{mt_diagnostic, mt_emit};
//!
//! // Emit a custom diagnostic
//! mt_diagnostic!(
//!     Warning,
//!     code = "MT999",
//!     message = "pool adapter bypassed the tracker",
//!     help = "route the block through entry_add()"
//! );
//!
//! // Emit a predefined diagnostic with context
//! mt_emit!(MT203, "main.rs:42 address=0x7f00");
//! ```

// Core diagnostic types
pub mod kind;
pub mod emit;
pub mod strict;
pub mod macros;

// Re-export core types
pub use kind::{Diagnostic, DiagnosticKind};
pub use emit::{
    emit, emit_to, emit_with_context, is_suppressed, set_verbose, suppress_diagnostics, write_diagnostic,
    Collected, CollectingSink, DiagnosticSink,
};
pub use strict::{init_from_env, set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

// Re-export predefined diagnostics
pub use kind::{
    MT001, MT002, MT003, MT004, MT101, MT201, MT202, MT203, MT204, MT205, MT206, MT207, MT301,
    MT302, MT401, MT402, MT403, MT901, MT902,
};
