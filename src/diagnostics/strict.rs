//! Strict mode handling for diagnostics.
//!
//! Allows configuration of how diagnostics are treated:
//! - Warn: Just emit the diagnostic
//! - Panic: Emit and then panic (useful for CI)
//!
//! The process-wide mode is set with [`set_strict_mode`] or from the
//! `MEMTRACK_STRICT` environment variable. [`StrictModeGuard`] overrides it
//! for the current thread only.

use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};

/// Strict mode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrictMode {
    /// Just warn, don't panic.
    Warn = 0,
    /// Panic on errors.
    PanicOnError = 1,
    /// Panic on errors and warnings.
    PanicOnWarning = 2,
}

impl From<u8> for StrictMode {
    fn from(val: u8) -> Self {
        match val {
            1 => StrictMode::PanicOnError,
            2 => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }
}

/// Process-wide strict mode setting.
static STRICT_MODE: AtomicU8 = AtomicU8::new(0);

thread_local! {
    static THREAD_OVERRIDE: Cell<Option<StrictMode>> = const { Cell::new(None) };
}

/// Set the process-wide strict mode.
pub fn set_strict_mode(mode: StrictMode) {
    STRICT_MODE.store(mode as u8, Ordering::Relaxed);
}

/// Get the strict mode in effect on this thread.
pub fn strict_mode() -> StrictMode {
    THREAD_OVERRIDE
        .with(Cell::get)
        .unwrap_or_else(|| StrictMode::from(STRICT_MODE.load(Ordering::Relaxed)))
}

/// Check if we should panic for an error diagnostic.
pub fn should_panic() -> bool {
    matches!(strict_mode(), StrictMode::PanicOnError | StrictMode::PanicOnWarning)
}

/// Check if we should panic for warnings.
pub fn should_panic_on_warning() -> bool {
    matches!(strict_mode(), StrictMode::PanicOnWarning)
}

/// RAII guard that overrides strict mode on the current thread.
pub struct StrictModeGuard {
    previous: Option<StrictMode>,
}

impl StrictModeGuard {
    /// Override strict mode for this thread until the guard drops.
    pub fn new(mode: StrictMode) -> Self {
        let previous = THREAD_OVERRIDE.with(|cell| cell.replace(Some(mode)));
        Self { previous }
    }

    /// Create a guard that enables panic-on-error.
    pub fn panic_on_error() -> Self {
        Self::new(StrictMode::PanicOnError)
    }

    /// Create a guard that enables panic-on-warning.
    pub fn panic_on_warning() -> Self {
        Self::new(StrictMode::PanicOnWarning)
    }
}

impl Drop for StrictModeGuard {
    fn drop(&mut self) {
        THREAD_OVERRIDE.with(|cell| cell.set(self.previous));
    }
}

/// Parse a strict-mode setting the way `MEMTRACK_STRICT` is read.
///
/// - "0" or "warn" -> Warn
/// - "1" or "error" -> PanicOnError
/// - "2" or "warning" -> PanicOnWarning
pub fn parse_strict_mode(val: &str) -> StrictMode {
    match val.trim().to_lowercase().as_str() {
        "1" | "error" | "true" => StrictMode::PanicOnError,
        "2" | "warning" | "all" => StrictMode::PanicOnWarning,
        _ => StrictMode::Warn,
    }
}

/// Initialize the process-wide strict mode from `MEMTRACK_STRICT`.
pub fn init_from_env() {
    if let Ok(val) = std::env::var("MEMTRACK_STRICT") {
        set_strict_mode(parse_strict_mode(&val));
    }
}
