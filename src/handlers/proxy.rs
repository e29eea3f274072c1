//! The `/github/*` proxy endpoint.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::ALLOW;
use axum::http::{HeaderName, StatusCode};
use tracing::instrument;

use crate::error::ProxyResult;
use crate::middleware::client_identity;
use crate::pipeline::{ProxyRequest, ProxyResponse};
use crate::state::AppState;

/// Path prefix routed to the upstream.
pub const PROXY_PREFIX: &str = "/github/";

/// Forward `GET /github/{path}` to the upstream API.
///
/// The trailing path is taken from the raw URI so percent-encoding reaches
/// upstream unchanged.
///
/// # Errors
///
/// - 429 with a fixed plain-text message when the client is over quota
/// - 401 `{"error":"Unauthorized"}` for a missing or wrong `api_key`
/// - upstream's non-2xx status with `{"error":"Request failed with status code N"}`
/// - 500 `{"error":"<transport message>"}` when upstream is unreachable
#[instrument(skip_all)]
pub async fn proxy(State(state): State<AppState>, req: Request<Body>) -> ProxyResult<ProxyResponse> {
    let identity = client_identity(&req, &state.trusted_proxies);
    let trailing_path = req
        .uri()
        .path()
        .strip_prefix(PROXY_PREFIX)
        .unwrap_or_default();

    let request = ProxyRequest::new(identity, trailing_path, req.uri().query());
    state.pipeline.handle(&request).await
}

/// Answer HEAD on the proxy route with 405.
///
/// axum would otherwise run the GET handler for HEAD, spending quota and
/// caching a response nobody reads.
pub async fn method_not_allowed() -> (StatusCode, [(HeaderName, &'static str); 1]) {
    (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET")])
}
