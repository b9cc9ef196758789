//! The process-wide tracker.
//!
//! One [`Tracker`] with the build's default metadata and lock backend,
//! created on first use. The first time it creates its table it registers
//! an exit hook with `libc::atexit`; the hook runs [`Tracker::shutdown`],
//! which reports what is still live and destroys the table.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Once, OnceLock};

use crate::api::config::TrackerConfig;
use crate::api::tracker::Tracker;
use crate::diagnostics::strict;

static GLOBAL: OnceLock<Tracker> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

/// The process-wide tracker.
///
/// Strict mode is read from `MEMTRACK_STRICT` when it is first created.
pub fn global() -> &'static Tracker {
    GLOBAL.get_or_init(|| {
        strict::init_from_env();
        Tracker::with_config(TrackerConfig::default()).with_first_table_hook(register_exit_hook)
    })
}

/// Whether the exit hook has been registered.
pub fn exit_hook_registered() -> bool {
    EXIT_HOOK.is_completed()
}

fn register_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // SAFETY: `run_exit_hook` is a plain `extern "C" fn()`.
        unsafe { libc::atexit(run_exit_hook) };
    });
}

extern "C" fn run_exit_hook() {
    if let Some(tracker) = GLOBAL.get() {
        // Unwinding out of an atexit handler aborts; strict mode may panic.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| tracker.shutdown()));
    }
}
