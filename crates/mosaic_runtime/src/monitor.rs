//! Pass metrics.
//!
//! Counts what one render pass did, for the response and the pass-end log line.

use serde::Serialize;
use std::time::Duration;

/// Metrics of one render pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassMetrics {
    /// Items in the render plan
    pub planned: u64,
    /// Components whose lifecycle completed with an operation dispatched
    pub rendered: u64,
    /// Components whose lifecycle completed while invisible
    pub skipped: u64,
    /// Components whose lifecycle failed
    pub failed: u64,
    /// State bindings written
    pub bindings_resolved: u64,
    /// Wall time of the pass in milliseconds
    pub elapsed_ms: u64,
}

impl PassMetrics {
    /// Create new metrics for a plan
    #[must_use]
    pub fn new(planned: usize) -> Self {
        Self {
            planned: planned as u64,
            ..Self::default()
        }
    }

    /// Record a completed component render
    pub fn record_render(&mut self, visible: bool) {
        if visible {
            self.rendered += 1;
        } else {
            self.skipped += 1;
        }
    }

    /// Record a failed component render
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Record written bindings
    pub fn record_bindings(&mut self, count: usize) {
        self.bindings_resolved += count as u64;
    }

    /// Record the pass duration
    pub fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }

    /// Components that finished their lifecycle
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.rendered + self.skipped
    }

    /// Planned components that never ran
    #[must_use]
    pub fn not_reached(&self) -> u64 {
        self.planned
            .saturating_sub(self.completed())
            .saturating_sub(self.failed)
    }
}
