use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Fixed message returned with every 429 from the proxy route.
pub const RATE_LIMIT_MESSAGE: &str =
    "Too many requests from this IP, please try again after a minute";

/// Proxy-wide error types with their HTTP status codes.
///
/// # Gate Errors
///
/// `RateLimited` and `Unauthorized` are produced before any upstream call is
/// made and never touch the cache.
///
/// # Upstream Errors
///
/// - `UpstreamTransport` - DNS, connection, or transport failure (no status)
/// - `UpstreamStatus` - upstream answered with a non-2xx status
///
/// Neither is retried, and neither creates a cache entry.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    UpstreamTransport(String),

    #[error("Request failed with status code {}", .0.as_u16())]
    UpstreamStatus(StatusCode),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProxyError {
    /// HTTP status this error is surfaced as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamStatus(status) => *status,
            ProxyError::UpstreamTransport(_) | ProxyError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response body for the proxy route: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            // The quota rejection is plain text, not JSON
            ProxyError::RateLimited => {
                return (status, RATE_LIMIT_MESSAGE).into_response();
            }
            ProxyError::Unauthorized => {}
            ProxyError::UpstreamStatus(_) => {
                tracing::warn!(status = status.as_u16(), "Upstream returned an error status");
            }
            ProxyError::UpstreamTransport(_) | ProxyError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
            }
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with ProxyError.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_is_plain_text_429() {
        let response = ProxyError::RateLimited.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("retry-after").is_none());
        assert_eq!(body_string(response).await, RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let response = ProxyError::Unauthorized.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, r#"{"error":"Unauthorized"}"#);
    }

    #[tokio::test]
    async fn test_transport_error_carries_message() {
        let response =
            ProxyError::UpstreamTransport("error sending request".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            r#"{"error":"error sending request"}"#
        );
    }

    #[tokio::test]
    async fn test_upstream_status_is_propagated() {
        let response = ProxyError::UpstreamStatus(StatusCode::NOT_FOUND).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_string(response).await,
            r#"{"error":"Request failed with status code 404"}"#
        );
    }
}
