//! HTTP middleware and request context.
//!
//! - **Client identity**: peer address, with forwarded headers honoured only
//!   from trusted proxies
//! - **API key guard**: protects `/stats`
//! - **Request ID**: generation and propagation of `X-Request-Id`
//!
//! # Architecture
//!
//! ```text
//! Request → Trace span → Request ID → Router ─┬─ /health
//!                             ↓               ├─ /stats ─ quota + API key guard ─ 429/401
//!                      X-Request-Id header    └─ /github/* ─ ProxyPipeline
//! ```
//!
//! Rate limiting and proxy authentication live in `pipeline`; the `/stats`
//! guard reuses the pipeline's quota so both routes share one budget.

pub mod auth;
pub mod ip;
pub mod request_id;

pub use auth::require_api_key;
pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_IP, client_identity};
pub use request_id::{REQUEST_ID_HEADER, RequestId, RequestIdLayer};
