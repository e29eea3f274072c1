//! API key guard for operational endpoints.
//!
//! Proxy routes authenticate inside the pipeline (after rate limiting). This
//! guard protects `/stats` the same way: every attempt is counted against the
//! caller's quota before the key is checked, so `/stats` offers no more key
//! guesses per window than `/github/*`. The key is accepted either way:
//!
//! ```bash
//! # Header method (preferred)
//! curl -H "X-API-Key: your-secret-key" http://localhost:3000/stats
//!
//! # Query parameter method
//! curl "http://localhost:3000/stats?api_key=your-secret-key"
//! ```
//!
//! `/health` is never guarded so load balancer probes work without a key.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::auth::{API_KEY_HEADER, api_key_from_query};
use crate::error::ProxyError;
use crate::middleware::ip::client_identity;
use crate::state::AppState;

/// Reject over-quota callers, then requests whose API key is missing or wrong.
///
/// Use with `axum::middleware::from_fn_with_state`.
///
/// # Errors
///
/// - `ProxyError::RateLimited` (429) once the caller's quota is used up
/// - `ProxyError::Unauthorized` (401) for a missing or wrong key
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ProxyError> {
    let identity = client_identity(&req, &state.trusted_proxies);
    state.pipeline.admit(&identity)?;

    let authenticator = state.pipeline.authenticator();

    match extract_api_key(&req) {
        Some(key) if authenticator.authenticate(&key) => {
            debug!(path = %req.uri().path(), "API key accepted");
            Ok(next.run(req).await)
        }
        provided => {
            warn!(
                path = %req.uri().path(),
                key_present = provided.is_some(),
                "Rejected request with missing or invalid API key"
            );
            Err(ProxyError::Unauthorized)
        }
    }
}

/// Header first, then the `api_key` query parameter.
fn extract_api_key<B>(req: &axum::http::Request<B>) -> Option<String> {
    if let Some(value) = req.headers().get(API_KEY_HEADER)
        && let Ok(key) = value.to_str()
    {
        return Some(key.to_string());
    }

    api_key_from_query(req.uri().query())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_from_header() {
        let req = axum::http::Request::builder()
            .uri("/stats")
            .header("x-api-key", "my-secret-key")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_api_key(&req).as_deref(), Some("my-secret-key"));
    }

    #[test]
    fn test_extract_api_key_from_query() {
        let req = axum::http::Request::builder()
            .uri("/stats?foo=1&api_key=query%2Dkey")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_api_key(&req).as_deref(), Some("query-key"));
    }

    #[test]
    fn test_header_takes_precedence() {
        let req = axum::http::Request::builder()
            .uri("/stats?api_key=from-query")
            .header("x-api-key", "from-header")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_api_key(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_api_key_missing() {
        let req = axum::http::Request::builder()
            .uri("/stats")
            .body(Body::empty())
            .unwrap();

        assert!(extract_api_key(&req).is_none());
    }
}
