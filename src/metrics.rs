// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the player cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `always_online_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: fetch, upsert, batch
//! - `status`: success, error, not_found

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache lookup outcome
pub fn record_cache_lookup(hit: bool) {
    counter!(
        "always_online_cache_lookups_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Set current number of cached records
pub fn set_cached_records(count: usize) {
    gauge!("always_online_cached_records").set(count as f64);
}

/// Record a storage operation outcome
pub fn record_store_operation(operation: &str, status: &str) {
    counter!(
        "always_online_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a (re)connect attempt
pub fn record_connect(success: bool) {
    counter!(
        "always_online_connects_total",
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record a reconnect triggered by a communications failure
pub fn record_reconnect(operation: &str) {
    counter!(
        "always_online_reconnects_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record the size of one executed batch
pub fn record_batch_size(count: usize) {
    histogram!("always_online_batch_size").record(count as f64);
}

/// Record a full flush
pub fn record_flush_duration(duration: Duration) {
    histogram!("always_online_flush_seconds").record(duration.as_secs_f64());
}

/// Timer that records storage latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(
            "always_online_store_operation_seconds",
            "operation" => self.operation
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed: every call must be a silent no-op.

    #[test]
    fn test_counters() {
        record_cache_lookup(true);
        record_cache_lookup(false);
        record_store_operation("fetch", "success");
        record_connect(true);
        record_reconnect("upsert");
    }

    #[test]
    fn test_gauges_and_histograms() {
        set_cached_records(42);
        record_batch_size(1000);
        record_flush_duration(Duration::from_millis(12));
    }

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new("fetch");
        std::thread::sleep(Duration::from_millis(1));
        drop(timer);
    }
}
