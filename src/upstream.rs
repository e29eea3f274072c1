//! HTTP client for the upstream API.
//!
//! One GET per call, no retries, no auth headers, no explicit timeout (the
//! transport defaults apply). Status, content type and body are returned
//! verbatim; interpreting the status is the pipeline's job.

use std::time::Instant;

use axum::http::StatusCode;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics;

/// `User-Agent` sent on every upstream request.
///
/// GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// A complete upstream response.
///
/// This is also the cached value; `Bytes` keeps clones cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Whether the upstream status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Network-level failure talking to upstream. Carries no status code.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct UpstreamError {
    message: String,
}

impl UpstreamError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

/// Thin wrapper around a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Build a client with the proxy's `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http })
    }

    /// Issue a single GET against `url`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError` on DNS, connect, or body read failures.
    /// Any HTTP status, including 4xx/5xx, is returned as `Ok`.
    pub async fn fetch(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        let started = Instant::now();

        let result = self.send(url).await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(response) => {
                metrics::record_upstream_fetch(response.status.as_str(), elapsed);
                debug!(
                    url,
                    status = response.status.as_u16(),
                    bytes = response.body.len(),
                    elapsed_ms = elapsed * 1000.0,
                    "Upstream fetch completed"
                );
            }
            Err(e) => {
                metrics::record_upstream_fetch("error", elapsed);
                warn!(url, error = %e, "Upstream fetch failed");
            }
        }

        result
    }

    async fn send(&self, url: &str) -> Result<UpstreamResponse, UpstreamError> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_the_crate() {
        assert!(USER_AGENT.starts_with("github_proxy/"));
    }

    #[test]
    fn test_is_success() {
        let ok = UpstreamResponse {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::from_static(b"{}"),
        };
        let missing = UpstreamResponse {
            status: StatusCode::NOT_FOUND,
            ..ok.clone()
        };

        assert!(ok.is_success());
        assert!(!missing.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let client = UpstreamClient::new().unwrap();
        let err = client
            .fetch(&format!("http://127.0.0.1:{port}/users/octocat"))
            .await
            .expect_err("nothing is listening");

        assert!(!err.message().is_empty());
    }
}
