use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Proxy statistics response.
///
/// Counters are cumulative since process start; store sizes are current.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Entries physically held by the cache (expired ones until purged)
    pub cache_entries: usize,
    /// TTL applied to every cache entry
    pub cache_ttl_seconds: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Authenticated requests that went upstream
    pub cache_misses: u64,
    /// Upstream transport failures and non-2xx answers
    pub upstream_errors: u64,
    /// Requests rejected with 429
    pub rate_limited: u64,
    /// Requests rejected with 401
    pub unauthorized: u64,
    /// Client identities with a stored rate-limit window
    pub tracked_clients: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}
