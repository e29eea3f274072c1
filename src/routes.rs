//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← http_request span, response logged at INFO
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← X-Request-Id header, recorded on the span
//! └────────┬─────────┘
//!          ▼
//!      Router ──┬── GET /health            (public)
//!               ├── GET /stats             (quota + API key guard)
//!               └── GET /github/{*path}    (ProxyPipeline)
//! ```
//!
//! Rate limiting and authentication of `/github/*` happen inside the
//! pipeline. `/stats` draws on the same per-client quota; `/health` never
//! does. Only GET is proxied: HEAD and every other method get 405 without
//! touching quota or cache.

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::handlers;
use crate::middleware::{RequestIdLayer, require_api_key};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    if config.auth_configured() {
        info!("API key authentication enabled");
    } else {
        info!("No API_KEY set, every proxied request will be rejected with 401");
    }
    info!(
        window_ms = config.rate_limit_window.as_millis() as u64,
        max = config.rate_limit_max,
        trusted_proxies = config.trusted_proxies.len(),
        "Rate limiting enabled"
    );

    let stats = Router::new()
        .route("/stats", get(handlers::stats))
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/github/{*path}",
            get(handlers::proxy).head(handlers::method_not_allowed),
        )
        .merge(stats)
        // Order matters: the last layer added runs first
        .layer(RequestIdLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = tracing::field::Empty,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
