//! Diagnostic emission backend.
//!
//! Handles outputting diagnostics to stderr, logs, or custom sinks.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use super::kind::{Diagnostic, DiagnosticKind};
use super::strict::{should_panic, should_panic_on_warning};
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Global flag to enable verbose diagnostics.
static VERBOSE_DIAGNOSTICS: AtomicBool = AtomicBool::new(false);

/// Suppress all diagnostic output.
///
/// Sinks attached to a tracker still receive diagnostics.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Enable verbose diagnostic output.
pub fn set_verbose(verbose: bool) {
    VERBOSE_DIAGNOSTICS.store(verbose, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic to stderr.
///
/// Writes in every build profile unless [`suppress_diagnostics`] is on.
pub fn emit(diag: &Diagnostic) {
    emit_to(&mut std::io::stderr().lock(), diag, None);
}

/// Emit a diagnostic with additional runtime context.
///
/// The context is usually the call site followed by the address and size
/// the operation was working on.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    emit_to(&mut std::io::stderr().lock(), diag, Some(context));
}

/// Emit a diagnostic to `out` instead of stderr.
pub fn emit_to<W: Write>(out: &mut W, diag: &Diagnostic, context: Option<&str>) {
    if !is_suppressed() {
        write_diagnostic(out, diag, context);

        #[cfg(feature = "log")]
        emit_to_log(diag, context);
    }

    enforce_strict(diag, context);
}

fn enforce_strict(diag: &Diagnostic, context: Option<&str>) {
    let fatal = match diag.kind {
        DiagnosticKind::Error => should_panic(),
        DiagnosticKind::Warning => should_panic_on_warning(),
        DiagnosticKind::Note | DiagnosticKind::Help => false,
    };
    if !fatal {
        return;
    }

    match context {
        Some(context) => panic!(
            "[memtrack][{}] {}\nContext: {}\nStrict mode enabled - diagnostics are fatal.",
            diag.code, diag.message, context
        ),
        None => panic!(
            "[memtrack][{}] {}\nStrict mode enabled - diagnostics are fatal.",
            diag.code, diag.message
        ),
    }
}

/// Render a diagnostic in the rustc-like layout used on stderr.
pub fn write_diagnostic<W: Write>(out: &mut W, diag: &Diagnostic, context: Option<&str>) {
    let _ = writeln!(
        out,
        "[memtrack][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );

    if let Some(context) = context {
        let _ = writeln!(out, "  --> {}", context);
    }
    if let Some(note) = diag.note {
        let _ = writeln!(out, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(out, "  help: {}", help);
    }

    if VERBOSE_DIAGNOSTICS.load(Ordering::Relaxed) && diag.kind == DiagnosticKind::Error {
        let _ = writeln!(out, "  hint: enable the `debug` feature for allocation sites and backtraces");
    }

    let _ = writeln!(out);
}

/// Emit a diagnostic using the log crate.
#[cfg(feature = "log")]
pub fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let context = context.unwrap_or("-");
    match diag.kind {
        DiagnosticKind::Error => {
            log::error!("[{}] {} ({})", diag.code, diag.message, context);
        }
        DiagnosticKind::Warning => {
            log::warn!("[{}] {} ({})", diag.code, diag.message, context);
        }
        DiagnosticKind::Note | DiagnosticKind::Help => {
            log::info!("[{}] {} ({})", diag.code, diag.message, context);
        }
    }

    if let Some(note) = diag.note {
        log::info!("  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::info!("  help: {}", help);
    }
}

/// A diagnostic sink trait for custom output.
///
/// A tracker configured with a sink forwards every diagnostic it raises,
/// together with the rendered context, before the global emission runs.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic, context: Option<&str>);
}

/// A diagnostic captured by [`CollectingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    /// The diagnostic itself.
    pub diagnostic: Diagnostic,
    /// Context supplied at the emission site.
    pub context: Option<String>,
}

/// A simple sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Collected>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Collected> {
        self.diagnostics.lock().clone()
    }

    /// Codes of the collected diagnostics, in emission order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics
            .lock()
            .iter()
            .map(|c| c.diagnostic.code)
            .collect()
    }

    /// How many times `code` was emitted.
    pub fn count(&self, code: &str) -> usize {
        self.diagnostics
            .lock()
            .iter()
            .filter(|c| c.diagnostic.code == code)
            .count()
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|c| c.diagnostic.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: Option<&str>) {
        self.diagnostics.lock().push(Collected {
            diagnostic: diag.clone(),
            context: context.map(str::to_owned),
        });
    }
}
