//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define navigation metrics (throughput, latency, failures)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track match outcomes and deferred-value traffic
//!
//! # Metrics
//! - `waypoint_navigations_total` (counter): navigations by status
//! - `waypoint_navigation_duration_seconds` (histogram): end-to-end latency
//! - `waypoint_pipeline_duration_seconds` (histogram): pipeline stage only
//! - `waypoint_match_outcomes_total` (counter): trie hits and misses
//! - `waypoint_loader_failures_total` (counter): isolated failures by route
//! - `waypoint_deferred_chunks_total` (counter): streamed chunks by result
//! - `waypoint_superseded_total` (counter): navigations discarded as stale
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Route label carries the virtual path, never raw URLs, to keep
//!   cardinality bounded

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
///
/// Failure to bind is logged and otherwise ignored; the server is more
/// important than its metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "failed to install metrics exporter"),
    }
}

/// One finished navigation request, by response status.
pub fn record_navigation(status: u16, duration: Duration) {
    metrics::counter!("waypoint_navigations_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("waypoint_navigation_duration_seconds").record(duration.as_secs_f64());
}

/// One pipeline run, successful or not.
pub fn record_pipeline_duration(duration: Duration) {
    metrics::histogram!("waypoint_pipeline_duration_seconds").record(duration.as_secs_f64());
}

/// One matcher lookup.
pub fn record_match(matched: bool) {
    let outcome = if matched { "hit" } else { "miss" };
    metrics::counter!("waypoint_match_outcomes_total", "outcome" => outcome).increment(1);
}

/// One isolated loader failure.
pub fn record_loader_failure(route: &str) {
    metrics::counter!("waypoint_loader_failures_total", "route" => route.to_string()).increment(1);
}

/// One deferred chunk pushed to a streaming response.
pub fn record_deferred_chunk(failed: bool) {
    let result = if failed { "error" } else { "ok" };
    metrics::counter!("waypoint_deferred_chunks_total", "result" => result).increment(1);
}

/// One navigation discarded because a newer one took its session.
pub fn record_superseded() {
    metrics::counter!("waypoint_superseded_total").increment(1);
}
