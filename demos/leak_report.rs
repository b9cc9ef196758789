//! Leak report example for memtrack
//!
//! Allocates through a detailed tracker, releases one block twice, leaks
//! another, and prints what the tracker saw.
//!
//! Run with: cargo run --example leak_report

use std::sync::Arc;

use memtrack::{site, CollectingSink, Detailed, Tracker, TrackerConfig};

fn main() {
    let sink = Arc::new(CollectingSink::new());
    let tracker = Tracker::<Detailed>::with_config(TrackerConfig::default().with_sink(sink.clone()));

    println!("Hello, memtrack!");

    // A block that grows, then is released twice
    let buffer = tracker.malloc(64, site!()).expect("malloc");
    let buffer = unsafe { tracker.realloc(buffer.as_ptr(), 256, site!()) }
        .expect("realloc")
        .expect("non-zero size");
    println!("Buffer is {} bytes", tracker.get_size(buffer.as_ptr(), site!()));

    unsafe {
        tracker.free(buffer.as_ptr(), site!());
        tracker.free(buffer.as_ptr(), site!());
    }
    if let Some(last) = tracker.last_error() {
        println!("Second release refused: {}", last);
    }

    // A block nobody releases
    let _forgotten = tracker.calloc(16, 8, site!()).expect("calloc");

    println!("\nTable before shutdown:");
    tracker.report_all();
    println!("\n{}", tracker.stats());

    let report = tracker.shutdown();
    println!(
        "Shutdown: {} leaked ({} bytes), {} already released",
        report.leak_count(),
        report.leaked_bytes(),
        report.already_released
    );

    println!("\nDiagnostics seen by the sink:");
    for collected in sink.diagnostics() {
        println!(
            "  {} {}",
            collected.diagnostic.code,
            collected.context.as_deref().unwrap_or("")
        );
    }
}
