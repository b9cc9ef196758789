//! Tracker configuration.

use std::fmt;
use std::sync::Arc;

use crate::diagnostics::DiagnosticSink;

/// Configuration for a [`Tracker`](crate::Tracker).
#[derive(Clone)]
pub struct TrackerConfig {
    /// Entries the table has room for when it is created (default: 64)
    pub initial_capacity: usize,

    /// Attempts made to create the table before giving up (default: 4)
    pub creation_attempts: usize,

    /// Receives every diagnostic the tracker raises, with its context
    pub sink: Option<Arc<dyn DiagnosticSink>>,

    /// Raise a leak diagnostic per live entry at shutdown (default: true)
    pub report_leaks: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            creation_attempts: 4,
            sink: None,
            report_leaks: true,
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("initial_capacity", &self.initial_capacity)
            .field("creation_attempts", &self.creation_attempts)
            .field("sink", &self.sink.as_ref().map(|_| "<dyn DiagnosticSink>"))
            .field("report_leaks", &self.report_leaks)
            .finish()
    }
}

impl TrackerConfig {
    /// Create a minimal config for tests or constrained environments.
    pub fn minimal() -> Self {
        Self {
            initial_capacity: 4,
            creation_attempts: 1,
            sink: None,
            report_leaks: false,
        }
    }

    /// Builder pattern: set the initial table capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Builder pattern: set the number of table creation attempts.
    pub fn with_creation_attempts(mut self, attempts: usize) -> Self {
        self.creation_attempts = attempts;
        self
    }

    /// Builder pattern: attach a diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builder pattern: enable or disable leak diagnostics at shutdown.
    pub fn with_leak_reports(mut self, enable: bool) -> Self {
        self.report_leaks = enable;
        self
    }
}
