//! The proxy request pipeline.
//!
//! # Gates
//!
//! ```text
//! ProxyRequest
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Rate Limiter    │ ← 429, no upstream call
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authenticator   │ ← 401, no upstream call
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Cache lookup    │ ← hit: 200, cached body, x-cache: HIT
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Upstream fetch  │ ← 2xx: cached + returned
//! └──────────────────┘   non-2xx: status propagated, not cached
//!                        transport error: 500, not cached
//! ```
//!
//! Every request runs the gates once, in order, without retries. The only
//! state shared between requests lives in the limiter and the cache, both
//! owned by the pipeline instance.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, HeaderValue};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, instrument, warn};

use crate::auth::{API_KEY_QUERY, Authenticator};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::limiter::FixedWindowLimiter;
use crate::metrics;
use crate::models::StatsResponse;
use crate::upstream::{UpstreamClient, UpstreamResponse};

/// Response header marking whether the body came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Per-request context, built once at pipeline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Rate-limit identity (client address)
    pub identity: String,
    /// Value of the `api_key` query parameter, if any
    pub credential: Option<String>,
    /// Path after the `/github/` prefix, verbatim (not percent-decoded)
    pub trailing_path: String,
    /// Raw inbound query string, `api_key` included
    pub query: Option<String>,
}

impl ProxyRequest {
    /// Build a request context, extracting the credential from `query`.
    pub fn new(
        identity: impl Into<String>,
        trailing_path: impl Into<String>,
        query: Option<&str>,
    ) -> Self {
        Self {
            identity: identity.into(),
            credential: crate::auth::api_key_from_query(query),
            trailing_path: trailing_path.into(),
            query: query.map(str::to_string),
        }
    }
}

/// Where a successful response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A successful pipeline result.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub upstream: UpstreamResponse,
    pub cache_status: CacheStatus,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let content_type = self
            .upstream
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        (
            self.upstream.status,
            [
                (CONTENT_TYPE, content_type),
                (
                    axum::http::HeaderName::from_static(CACHE_STATUS_HEADER),
                    HeaderValue::from_static(self.cache_status.as_str()),
                ),
            ],
            self.upstream.body,
        )
            .into_response()
    }
}

/// Monotonic pipeline counters for the `/stats` endpoint.
#[derive(Debug, Default)]
struct PipelineCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_errors: AtomicU64,
    rate_limited: AtomicU64,
    unauthorized: AtomicU64,
}

/// Orchestrates rate limiting, authentication, caching and upstream fetches.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ProxyPipeline {
    limiter: FixedWindowLimiter,
    authenticator: Authenticator,
    cache: CacheStore<UpstreamResponse>,
    upstream: UpstreamClient,
    upstream_base_url: String,
    counters: PipelineCounters,
}

impl ProxyPipeline {
    /// Build a pipeline from configuration with fresh, empty stores.
    pub fn new(config: &Config, upstream: UpstreamClient) -> Self {
        Self::with_components(
            FixedWindowLimiter::new(config.rate_limit_window, config.rate_limit_max),
            Authenticator::new(config.api_key.clone()),
            CacheStore::new(config.cache_ttl),
            upstream,
            config.upstream_base_url.clone(),
        )
    }

    /// Build a pipeline from explicit components.
    pub fn with_components(
        limiter: FixedWindowLimiter,
        authenticator: Authenticator,
        cache: CacheStore<UpstreamResponse>,
        upstream: UpstreamClient,
        upstream_base_url: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            authenticator,
            cache,
            upstream,
            upstream_base_url: upstream_base_url.into(),
            counters: PipelineCounters::default(),
        }
    }

    /// Run one request through all gates.
    ///
    /// # Errors
    ///
    /// - `ProxyError::RateLimited` - identity over quota
    /// - `ProxyError::Unauthorized` - missing or wrong credential
    /// - `ProxyError::UpstreamTransport` - network failure talking to upstream
    /// - `ProxyError::UpstreamStatus` - upstream answered non-2xx
    #[instrument(skip(self, request), fields(identity = %request.identity, path = %request.trailing_path))]
    pub async fn handle(&self, request: &ProxyRequest) -> ProxyResult<ProxyResponse> {
        self.admit(&request.identity)?;

        let authenticated = request
            .credential
            .as_deref()
            .is_some_and(|c| self.authenticator.authenticate(c));
        if !authenticated {
            self.counters.unauthorized.fetch_add(1, Ordering::Relaxed);
            metrics::record_outcome(metrics::outcome::UNAUTHORIZED);
            warn!(
                client_ip = %request.identity,
                credential_present = request.credential.is_some(),
                "Rejected request with missing or invalid API key"
            );
            return Err(ProxyError::Unauthorized);
        }

        let url = self.upstream_url(request);

        if let Some(mut cached) = self.cache.get(&url) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_outcome(metrics::outcome::CACHE_HIT);
            info!(url = %url, "Serving cached response");
            // Hits are always 200, whichever 2xx populated the entry
            cached.status = StatusCode::OK;
            return Ok(ProxyResponse {
                upstream: cached,
                cache_status: CacheStatus::Hit,
            });
        }

        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, "Cache miss, fetching from upstream");

        let response = match self.upstream.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                self.counters.upstream_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_outcome(metrics::outcome::UPSTREAM_ERROR);
                return Err(ProxyError::UpstreamTransport(e.to_string()));
            }
        };

        if !response.is_success() {
            self.counters.upstream_errors.fetch_add(1, Ordering::Relaxed);
            metrics::record_outcome(metrics::outcome::UPSTREAM_STATUS);
            return Err(ProxyError::UpstreamStatus(response.status));
        }

        self.cache.set(url, response.clone());
        metrics::record_outcome(metrics::outcome::CACHE_MISS);
        metrics::set_cache_entries(self.cache.len());

        Ok(ProxyResponse {
            upstream: response,
            cache_status: CacheStatus::Miss,
        })
    }

    /// Count one request against `identity`'s quota.
    ///
    /// Shared by every route that checks the API key, so key guesses are
    /// bounded per window whichever endpoint they hit.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::RateLimited` once the identity is over quota.
    pub fn admit(&self, identity: &str) -> ProxyResult<()> {
        if self.limiter.allow(identity) {
            return Ok(());
        }

        self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
        metrics::record_outcome(metrics::outcome::RATE_LIMITED);
        warn!(client_ip = %identity, "Rate limit exceeded for client");
        Err(ProxyError::RateLimited)
    }

    /// The cache key and fetch target for `request`.
    pub fn upstream_url(&self, request: &ProxyRequest) -> String {
        build_upstream_url(
            &self.upstream_base_url,
            &request.trailing_path,
            request.query.as_deref(),
        )
    }

    /// Purge expired cache entries only.
    pub fn purge_cache(&self) -> usize {
        let purged = self.cache.purge_expired();
        metrics::set_cache_entries(self.cache.len());
        purged
    }

    /// Drop ended rate-limit windows only.
    pub fn evict_idle_clients(&self) -> usize {
        let evicted = self.limiter.evict_expired();
        metrics::set_tracked_clients(self.limiter.tracked_identities());
        evicted
    }

    /// The authenticator, shared with the `/stats` guard.
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// The rate-limit window length.
    pub fn rate_limit_window(&self) -> std::time::Duration {
        self.limiter.window()
    }

    /// Snapshot of the pipeline counters and store sizes.
    pub fn stats(&self, uptime_seconds: u64) -> StatsResponse {
        StatsResponse {
            cache_entries: self.cache.len(),
            cache_ttl_seconds: self.cache.ttl().as_secs(),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            upstream_errors: self.counters.upstream_errors.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            unauthorized: self.counters.unauthorized.load(Ordering::Relaxed),
            tracked_clients: self.limiter.tracked_identities(),
            uptime_seconds,
        }
    }
}

/// Build `base/trailing_path[?query]`, dropping every `api_key` parameter
/// from the query so the secret never reaches upstream.
///
/// The remaining parameters keep their original encoding and order; empty
/// `&&` segments are dropped.
pub fn build_upstream_url(base: &str, trailing_path: &str, query: Option<&str>) -> String {
    let mut url = format!("{base}/{trailing_path}");
    if let Some(forwarded) = query.and_then(forwarded_query) {
        url.push('?');
        url.push_str(&forwarded);
    }
    url
}

/// The inbound query minus `api_key`, or `None` if nothing remains.
fn forwarded_query(query: &str) -> Option<String> {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_api_key_pair(pair))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

fn is_api_key_pair(pair: &str) -> bool {
    url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .is_some_and(|(key, _)| key == API_KEY_QUERY)
}
