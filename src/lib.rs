//! # GitHub API Proxy
//!
//! An authenticated, rate-limited, caching reverse proxy for the GitHub
//! REST API. `GET /github/{path}?api_key=...` is forwarded to
//! `{UPSTREAM_BASE_URL}/{path}` and the response is relayed back.
//!
//! - **Rate limiting**: fixed window per client address (default 5/min)
//! - **Authentication**: shared secret in the `api_key` query parameter
//! - **Caching**: successful upstream bodies cached in memory by URL
//! - **Observability**: request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Trace → Request ID)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, stats, proxy)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProxyPipeline (limiter → auth → cache → upstream)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UpstreamClient (reqwest, rustls)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use github_proxy::{AppState, Config, UpstreamClient, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, UpstreamClient::new()?);
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod utils;

// Re-exports for convenience
pub use auth::Authenticator;
pub use cache::CacheStore;
pub use config::Config;
pub use error::{ProxyError, ProxyResult};
pub use limiter::FixedWindowLimiter;
pub use pipeline::{
    CacheStatus, ProxyPipeline, ProxyRequest, ProxyResponse, build_upstream_url,
};
pub use routes::build_router;
pub use state::AppState;
pub use upstream::{UpstreamClient, UpstreamResponse};
