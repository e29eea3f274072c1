//! Prometheus metrics for proxy observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `proxy_requests_total` - Proxied requests by outcome (label: outcome)
//!
//! ## Histograms
//! - `proxy_upstream_fetch_duration_seconds` - Upstream GET latency (label: status)
//!
//! ## Gauges
//! - `proxy_cache_entries` - Entries currently held by the cache
//! - `proxy_tracked_clients` - Client identities with a rate-limit window
//!
//! Recording functions are no-ops until `init_metrics` installs a recorder,
//! so tests never need a Prometheus listener.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
    pub const UPSTREAM_FETCH_DURATION_SECONDS: &str = "proxy_upstream_fetch_duration_seconds";
    pub const CACHE_ENTRIES: &str = "proxy_cache_entries";
    pub const TRACKED_CLIENTS: &str = "proxy_tracked_clients";
}

/// Values of the `outcome` label on `proxy_requests_total`.
pub mod outcome {
    pub const CACHE_HIT: &str = "cache_hit";
    pub const CACHE_MISS: &str = "cache_miss";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const UPSTREAM_STATUS: &str = "upstream_status";
}

/// Initialize the Prometheus metrics exporter.
///
/// This sets up metric descriptions and starts the Prometheus HTTP listener
/// on the specified address.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of proxied requests by outcome"
    );
    describe_histogram!(
        names::UPSTREAM_FETCH_DURATION_SECONDS,
        "Upstream fetch duration in seconds"
    );
    describe_gauge!(
        names::CACHE_ENTRIES,
        "Number of entries currently held by the response cache"
    );
    describe_gauge!(
        names::TRACKED_CLIENTS,
        "Number of client identities with an active rate-limit window"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record the outcome of one proxied request.
pub fn record_outcome(outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record the duration of one upstream fetch.
pub fn record_upstream_fetch(status: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_FETCH_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

/// Update the cache size gauge.
pub fn set_cache_entries(entries: usize) {
    gauge!(names::CACHE_ENTRIES).set(entries as f64);
}

/// Update the tracked client gauge.
pub fn set_tracked_clients(clients: usize) {
    gauge!(names::TRACKED_CLIENTS).set(clients as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the recorders don't panic without an installed exporter.

    #[test]
    fn test_record_outcome() {
        record_outcome(outcome::CACHE_HIT);
        record_outcome(outcome::RATE_LIMITED);
    }

    #[test]
    fn test_record_upstream_fetch() {
        record_upstream_fetch("200", 0.12);
        record_upstream_fetch("error", 0.5);
    }

    #[test]
    fn test_set_gauges() {
        set_cache_entries(3);
        set_tracked_clients(0);
    }
}
