//! Build script for memtrack.
//!
//! Reports which metadata flavor, lock backend and tracking mode a build
//! gets, so a tracker that silently records less than expected is visible.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DISABLE");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_SPIN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=MEMTRACK_BUILD_QUIET");

    if env::var("MEMTRACK_BUILD_QUIET").is_ok() {
        return;
    }

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let disable_enabled = env::var("CARGO_FEATURE_DISABLE").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let spin_enabled = env::var("CARGO_FEATURE_SPIN").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Tracking mode
    // =========================================================================

    if disable_enabled {
        emit_info("Tracking disabled: crate functions pass straight to the C heap");
        if debug_enabled {
            emit_warning("'debug' has no effect on the crate functions while 'disable' is on");
            emit_note("Explicit Tracker<Detailed> instances still record sites.");
        }
    } else if debug_enabled {
        emit_info("Detailed metadata: allocation, resize and release sites recorded");
        emit_note("Double frees are refused and reported with both sites.");
        if is_release {
            emit_warning("Detailed tracking enabled in release build!");
            emit_note("Every block carries a backtrace. Consider 'disable' for production.");
        }
    } else {
        emit_note("Lean metadata: addresses and sizes only.");
        emit_note("Enable 'debug' for sites, double-free detection and backtraces:");
        emit_note("  memtrack = { version = \"0.9\", features = [\"debug\"] }");
    }

    // =========================================================================
    // Lock backend
    // =========================================================================

    if parking_lot_enabled && spin_enabled {
        emit_warning("Both 'parking_lot' and 'spin' enabled; parking_lot wins");
    }
    if parking_lot_enabled {
        emit_info("Tracker lock: parking_lot raw mutex");
    } else if spin_enabled {
        emit_info("Tracker lock: spinlock");
    }

    if log_enabled {
        emit_info("Diagnostics forwarded to the log crate");
    }

    check_target();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[memtrack] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[memtrack]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[memtrack] warning: {}", msg);
}

// =============================================================================
// Environment checks
// =============================================================================

fn check_target() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("windows") {
        emit_warning("No posix_memalign on this target");
        emit_note("Aligned allocation through LibcAllocator always fails here.");
    }

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("No atexit hook: call Tracker::shutdown explicitly for a leak report.");
    }
}
