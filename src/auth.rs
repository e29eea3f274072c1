//! Shared-secret authentication.
//!
//! Callers present the secret as the `api_key` query parameter:
//!
//! ```bash
//! curl "http://localhost:3000/github/users/octocat?api_key=your-secret-key"
//! ```
//!
//! # Semantics
//!
//! A credential is accepted iff it is non-empty and byte-for-byte equal to
//! the configured secret (case-sensitive). With no secret configured every
//! credential is rejected.
//!
//! # Security Features
//!
//! - **Constant-time comparison**: equal-length keys are compared without
//!   short-circuiting on the first differing byte
//! - **Never forwarded**: the pipeline strips `api_key` before building the
//!   upstream URL

use std::sync::Arc;

use subtle::ConstantTimeEq;

/// Query parameter name for the API key.
pub const API_KEY_QUERY: &str = "api_key";

/// Header name for the API key (accepted on `/stats` only).
pub const API_KEY_HEADER: &str = "x-api-key";

/// Validates presented credentials against the configured secret.
#[derive(Debug, Clone)]
pub struct Authenticator {
    /// Expected secret (None = every credential is rejected)
    secret: Option<Arc<str>>,
}

impl Authenticator {
    /// Create an authenticator for `secret`. Empty secrets count as unset.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    /// Check if a secret is configured at all.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Return whether `presented` matches the configured secret.
    pub fn authenticate(&self, presented: &str) -> bool {
        match &self.secret {
            Some(secret) if !presented.is_empty() => constant_time_eq(presented, secret),
            _ => false,
        }
    }
}

/// Extract the `api_key` value from a raw query string.
///
/// The first occurrence wins and the value is percent-decoded. A parameter
/// without `=` yields an empty credential, which never authenticates.
pub fn api_key_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == API_KEY_QUERY)
        .map(|(_, value)| value.into_owned())
}

/// Perform constant-time comparison of two strings.
///
/// Length differences return early; only the content comparison is
/// constant-time.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
