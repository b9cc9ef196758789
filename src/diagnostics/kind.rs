//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
    /// Actionable suggestion to fix the issue.
    Help,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
            DiagnosticKind::Help => "help",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `MT0xx` - Invalid arguments (rejected before any allocator call)
/// - `MT1xx` - System allocator failures
/// - `MT2xx` - Tracking desync (untracked address, double free)
/// - `MT3xx` - Table maintenance and shutdown
/// - `MT4xx` - Extension adapter validation
/// - `MT9xx` - Fatal and internal errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "MT001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// MT0xx - Invalid arguments
// =============================================================================

/// MT001: Zero-byte request.
pub const MT001: Diagnostic = Diagnostic::warning(
    "MT001",
    "no processing was done because the size is zero"
).with_note("zero-size requests are rejected instead of returning a minimal block");

/// MT002: Zero element count.
pub const MT002: Diagnostic = Diagnostic::warning(
    "MT002",
    "no processing was done because the count is zero"
);

/// MT003: count * size does not fit in usize.
pub const MT003: Diagnostic = Diagnostic::error(
    "MT003",
    "memory allocation overflow"
).with_note("count * size exceeds usize::MAX")
 .with_help("check the element count before allocating");

/// MT004: Resize to zero bytes.
pub const MT004: Diagnostic = Diagnostic::warning(
    "MT004",
    "resize to zero bytes releases the block and returns nothing"
).with_help("call free() instead of resizing to zero");

// =============================================================================
// MT1xx - System allocator
// =============================================================================

/// MT101: The system allocator returned no memory.
pub const MT101: Diagnostic = Diagnostic::error(
    "MT101",
    "memory allocation failed"
).with_note("the system allocator returned null; nothing was tracked");

// =============================================================================
// MT2xx - Tracking desync
// =============================================================================

/// MT201: Null pointer handed to the tracker.
pub const MT201: Diagnostic = Diagnostic::warning(
    "MT201",
    "pointer is null, memory cannot be tracked"
);

/// MT202: Resize of an untracked address.
pub const MT202: Diagnostic = Diagnostic::warning(
    "MT202",
    "no entry found to update, the memory might not be tracked"
).with_note("the resized block is tracked as a fresh allocation");

/// MT203: Release of an untracked address.
pub const MT203: Diagnostic = Diagnostic::warning(
    "MT203",
    "no entry found to free, the memory might not be tracked"
);

/// MT204: Size query for an untracked address.
pub const MT204: Diagnostic = Diagnostic::warning(
    "MT204",
    "no entry found to get size, the memory might not be tracked"
);

/// MT205: Double free.
pub const MT205: Diagnostic = Diagnostic::error(
    "MT205",
    "memory already freed"
).with_note("the second release was refused and did not reach the system allocator")
 .with_help("the context shows where the block was first released");

/// MT206: Size query on a null pointer.
pub const MT206: Diagnostic = Diagnostic::warning(
    "MT206",
    "cannot return a size because the pointer is null"
);

/// MT207: Zero-fill resize of an untracked address.
pub const MT207: Diagnostic = Diagnostic::warning(
    "MT207",
    "no entry found to recalloc, the memory might not be tracked"
).with_note("a fresh zero-initialized block is allocated instead");

// =============================================================================
// MT3xx - Table maintenance and shutdown
// =============================================================================

/// MT301: Leak found at shutdown.
pub const MT301: Diagnostic = Diagnostic::error(
    "MT301",
    "memory not freed"
).with_note("the block is released by the tracker during shutdown");

/// MT302: Entry insertion failed.
pub const MT302: Diagnostic = Diagnostic::error(
    "MT302",
    "failed to add entry to memory tracking"
).with_note("the table could not grow; the block is live but untracked");

// =============================================================================
// MT4xx - Extension adapters
// =============================================================================

/// MT401: Alignment is not a power of two or is smaller than a pointer.
pub const MT401: Diagnostic = Diagnostic::warning(
    "MT401",
    "alignment must be a power of two and at least the size of a pointer"
);

/// MT402: Aligned size is smaller than, or not a multiple of, the alignment.
pub const MT402: Diagnostic = Diagnostic::warning(
    "MT402",
    "size must be a non-zero multiple of the alignment"
);

/// MT403: N-dimensional array with no dimensions or an empty extent.
pub const MT403: Diagnostic = Diagnostic::warning(
    "MT403",
    "no processing was done because an array extent is zero"
);

// =============================================================================
// MT9xx - Fatal and internal
// =============================================================================

/// MT901: Tracking table could not be created.
pub const MT901: Diagnostic = Diagnostic::error(
    "MT901",
    "failed to initialize memory tracking"
).with_note("the tracking table could not be allocated after repeated attempts")
 .with_help("tracking cannot continue without its table; the process will exit");

/// MT902: Tracking table is gone.
pub const MT902: Diagnostic = Diagnostic::warning(
    "MT902",
    "tracking table is not available"
).with_note("the tracker has already been shut down; the operation was not tracked");
