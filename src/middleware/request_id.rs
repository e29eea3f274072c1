//! Request ID propagation.
//!
//! Every response carries an `x-request-id` header. A client-supplied value
//! is echoed back when it is short printable ASCII; anything else is replaced
//! by a fresh UUIDv4 so log lines cannot be forged through the header.
//!
//! ```bash
//! curl -i -H "X-Request-Id: trace-42" "http://localhost:3000/github/users/octocat?api_key=..."
//! # x-request-id: trace-42
//! ```
//!
//! The ID is recorded on the enclosing `http_request` span (see `routes`)
//! and stored as a [`RequestId`] extension for handlers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::Span;
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied ID that is echoed back.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// The request's correlation ID, available as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Tower layer attaching [`RequestIdService`].
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let (request_id, header) = resolve_request_id(&req);

        Span::current().record("request_id", request_id.as_str());
        req.headers_mut().insert(REQUEST_ID_HEADER, header.clone());
        req.extensions_mut().insert(RequestId(request_id));

        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response.headers_mut().insert(REQUEST_ID_HEADER, header);
            Ok(response)
        })
    }
}

/// Reuse an acceptable inbound ID or mint a new one.
fn resolve_request_id<B>(req: &Request<B>) -> (String, HeaderValue) {
    if let Some(value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(id) = value.to_str()
        && is_acceptable(id)
    {
        return (id.to_string(), value.clone());
    }

    let id = Uuid::new_v4().to_string();
    // A hyphenated UUID is always a valid header value
    let header = HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    (id, header)
}

fn is_acceptable(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}
