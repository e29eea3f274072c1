//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `API_KEY`: Shared secret callers pass as the `api_key` query parameter.
//!   When unset, every proxied request is rejected with 401.
//! - `TRUSTED_PROXIES`: CIDR ranges whose `X-Forwarded-For` header is honoured
//!   when deriving the client identity for rate limiting.
//!
//! # Proxy Tuning
//!
//! - `UPSTREAM_BASE_URL`: Upstream API base (default: `https://api.github.com`)
//! - `RATE_LIMIT_WINDOW_MS`: Fixed window length (default: 60000)
//! - `RATE_LIMIT_MAX`: Requests per client per window (default: 5)
//! - `CACHE_TTL`: Cache entry lifetime in seconds (default: 300)
//! - `CACHE_CHECK_PERIOD_SECS`: Expired entry sweep interval (default: 600, 0 = off)

use std::env;
use std::time::Duration;

use crate::error::{ProxyError, ProxyResult};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Proxying {} on {}", config.upstream_base_url, config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Upstream Configuration
    // =========================================================================
    /// Base URL that trailing paths are appended to, without a trailing slash.
    /// Default: "https://api.github.com"
    pub upstream_base_url: String,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Length of one fixed rate-limit window (default: 60s)
    pub rate_limit_window: Duration,

    /// Maximum requests per client identity per window (default: 5)
    pub rate_limit_max: u32,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Time-to-live of every cache entry (default: 300s)
    pub cache_ttl: Duration,

    /// Interval of the background sweep that purges expired entries
    /// (default: 600s, zero disables the sweep; expiry is still enforced on read)
    pub cache_check_period: Duration,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Shared API secret. `None` means authentication always fails.
    pub api_key: Option<String>,

    /// Trusted proxy CIDR ranges. `X-Forwarded-For` is only used as the
    /// client identity when the connecting peer is inside one of these.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (identity is always the socket peer address)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ConfigError` if any value is unparsable or fails
    /// validation (e.g., `RATE_LIMIT_MAX=0`, a relative `UPSTREAM_BASE_URL`).
    pub fn from_env() -> ProxyResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Upstream
            upstream_base_url: normalize_base_url(
                &env::var("UPSTREAM_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_UPSTREAM_BASE_URL.to_string()),
            ),

            // Rate limiting
            rate_limit_window: Duration::from_millis(Self::parse_env(
                "RATE_LIMIT_WINDOW_MS",
                60_000,
            )?),
            rate_limit_max: Self::parse_env("RATE_LIMIT_MAX", 5)?,

            // Cache
            cache_ttl: Duration::from_secs(Self::parse_env("CACHE_TTL", 300)?),
            cache_check_period: Duration::from_secs(Self::parse_env(
                "CACHE_CHECK_PERIOD_SECS",
                600,
            )?),

            // Security
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            trusted_proxies: Self::parse_trusted_proxies(),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::ConfigError` if validation fails.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.rate_limit_max == 0 {
            return Err(ProxyError::ConfigError(
                "RATE_LIMIT_MAX must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_window.is_zero() {
            return Err(ProxyError::ConfigError(
                "RATE_LIMIT_WINDOW_MS must be greater than 0".to_string(),
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(ProxyError::ConfigError(
                "CACHE_TTL must be greater than 0".to_string(),
            ));
        }

        match url::Url::parse(&self.upstream_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            Ok(url) => {
                return Err(ProxyError::ConfigError(format!(
                    "UPSTREAM_BASE_URL must be an absolute http(s) URL, got scheme '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(ProxyError::ConfigError(format!(
                    "Invalid UPSTREAM_BASE_URL '{}': {e}",
                    self.upstream_base_url
                )));
            }
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if a shared secret is configured.
    pub fn auth_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check if the background cache sweep should run.
    pub fn cache_sweep_enabled(&self) -> bool {
        !self.cache_check_period.is_zero()
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> ProxyResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| ProxyError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse trusted proxy CIDR ranges from environment variable.
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Upstream used when `UPSTREAM_BASE_URL` is not set.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.github.com";

/// Strip surrounding whitespace and trailing slashes so that
/// `base + "/" + path` never produces a double slash.
fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Upstream
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            // Rate limiting
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 5,
            // Cache
            cache_ttl: Duration::from_secs(300),
            cache_check_period: Duration::from_secs(600),
            // Security
            api_key: None,
            trusted_proxies: vec![],
            // Observability
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_base_url, "https://api.github.com");
        assert_eq!(config.rate_limit_window, Duration::from_millis(60_000));
        assert_eq!(config.rate_limit_max, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_auth_configured() {
        assert!(!Config::default().auth_configured());

        let config = Config {
            api_key: Some("secret-key".to_string()),
            ..Config::default()
        };
        assert!(config.auth_configured());
    }

    #[test]
    fn test_metrics_addr_disabled_on_zero_port() {
        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
        assert!(Config::default().metrics_addr().is_some());
    }

    #[test]
    fn test_cache_sweep_disabled_on_zero_period() {
        let config = Config {
            cache_check_period: Duration::ZERO,
            ..Config::default()
        };
        assert!(!config.cache_sweep_enabled());
    }

    #[test]
    fn test_normalize_base_url_trims_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://api.github.com// "),
            "https://api.github.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn test_validate_rate_limit_max_zero() {
        let config = Config {
            rate_limit_max: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_MAX"));
    }

    #[test]
    fn test_validate_window_zero() {
        let config = Config {
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("RATE_LIMIT_WINDOW_MS")
        );
    }

    #[test]
    fn test_validate_ttl_zero() {
        let config = Config {
            cache_ttl: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().unwrap_err().to_string().contains("CACHE_TTL"));
    }

    #[test]
    fn test_validate_relative_upstream() {
        let config = Config {
            upstream_base_url: "api.github.com".to_string(),
            ..Config::default()
        };

        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("UPSTREAM_BASE_URL")
        );
    }

    #[test]
    fn test_validate_non_http_upstream() {
        let config = Config {
            upstream_base_url: "ftp://example.com".to_string(),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
