//! Health and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness, public
//! - `GET /stats` - Pipeline counters and store sizes (API key required,
//!   counted against the caller's quota)
//!
//! Neither endpoint touches the upstream.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Statistics endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "cache_entries": 12,
///   "cache_ttl_seconds": 300,
///   "cache_hits": 40,
///   "cache_misses": 12,
///   "upstream_errors": 1,
///   "rate_limited": 3,
///   "unauthorized": 2,
///   "tracked_clients": 4,
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.pipeline.stats(state.uptime_seconds()))
}
