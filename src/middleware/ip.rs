//! Client identity extraction for rate limiting.
//!
//! The identity is the socket peer address delivered by
//! `into_make_service_with_connect_info::<SocketAddr>()`.
//!
//! # Forwarded Headers
//!
//! `X-Forwarded-For` (first hop) and `X-Real-IP` are honoured **only** when
//! the peer itself is inside a `TRUSTED_PROXIES` range. Otherwise a client
//! could rotate spoofed headers to reset its own quota.
//!
//! ```text
//!   peer in TRUSTED_PROXIES? ── yes ──► X-Forwarded-For[0] │ X-Real-IP │ peer
//!             │
//!             no ──────────────────────► peer
//!
//!   no ConnectInfo ────────────────────► "unknown"
//! ```
//!
//! Requests without connection info (e.g. a router driven directly by
//! `tower::ServiceExt::oneshot`) all share the [`UNKNOWN_IP`] identity.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Identity used when no peer address is available.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is treated as a single-host range.
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();

        let Some((addr, prefix)) = cidr.split_once('/') else {
            let ip: IpAddr = cidr.parse().ok()?;
            return Some(Self {
                network: ip,
                prefix_len: max_prefix(&ip),
            });
        };

        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;
        if prefix_len > max_prefix(&network) {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Set of reverse-proxy networks whose forwarded headers are believed.
///
/// Empty means no peer is trusted and identity is always the peer address.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Parse CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        Self { ranges }
    }

    /// Check if any trusted range is configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Check if `ip` belongs to a trusted proxy.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Identity Extraction
// =============================================================================

/// Derive the rate-limit identity for `req`.
pub fn client_identity<B>(req: &Request<B>, trusted_proxies: &TrustedProxyConfig) -> String {
    let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() else {
        return UNKNOWN_IP.to_string();
    };
    let peer_ip = peer.ip().to_canonical();

    if trusted_proxies.is_trusted(&peer_ip) {
        if let Some(forwarded) = forwarded_ip(req) {
            debug!(peer = %peer_ip, client_ip = forwarded, "Using forwarded client IP from trusted proxy");
            return forwarded.to_string();
        }
    } else if forwarded_ip(req).is_some() && trusted_proxies.is_enabled() {
        debug!(peer = %peer_ip, "Ignoring forwarded headers from untrusted peer");
    }

    peer_ip.to_string()
}

/// First non-empty address from `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_ip<B>(req: &Request<B>) -> Option<&str> {
    let from_xff = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    from_xff.or_else(|| {
        req.headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(peer: &str) -> axum::http::request::Builder {
        let addr: SocketAddr = peer.parse().unwrap();
        let mut builder = Request::builder().uri("/github/users/octocat");
        builder
            .extensions_mut()
            .unwrap()
            .insert(ConnectInfo(addr));
        builder
    }

    fn trusted(cidrs: &[&str]) -> TrustedProxyConfig {
        TrustedProxyConfig::new(&cidrs.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_identity_is_peer_address() {
        let req = request_from("203.0.113.7:51234").body(Body::empty()).unwrap();
        assert_eq!(
            client_identity(&req, &TrustedProxyConfig::default()),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_identity_ignores_port() {
        let a = request_from("203.0.113.7:1000").body(Body::empty()).unwrap();
        let b = request_from("203.0.113.7:2000").body(Body::empty()).unwrap();
        let config = TrustedProxyConfig::default();

        assert_eq!(client_identity(&a, &config), client_identity(&b, &config));
    }

    #[test]
    fn test_identity_unknown_without_connect_info() {
        let req = Request::builder()
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &trusted(&["0.0.0.0/0"])), UNKNOWN_IP);
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let req = request_from("203.0.113.7:1000")
            .header("x-forwarded-for", "1.2.3.4")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &trusted(&["10.0.0.0/8"])), "203.0.113.7");
        assert_eq!(
            client_identity(&req, &TrustedProxyConfig::default()),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_forwarded_header_used_from_trusted_peer() {
        let req = request_from("10.1.2.3:1000")
            .header("x-forwarded-for", " 198.51.100.20 , 10.1.2.3")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &trusted(&["10.0.0.0/8"])), "198.51.100.20");
    }

    #[test]
    fn test_real_ip_used_when_no_xff() {
        let req = request_from("10.1.2.3:1000")
            .header("x-real-ip", "198.51.100.21")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &trusted(&["10.0.0.0/8"])), "198.51.100.21");
    }

    #[test]
    fn test_trusted_peer_without_headers_falls_back_to_peer() {
        let req = request_from("10.1.2.3:1000")
            .header("x-forwarded-for", "  ")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_identity(&req, &trusted(&["10.0.0.0/8"])), "10.1.2.3");
    }

    #[test]
    fn test_ipv4_mapped_peer_is_canonicalised() {
        let req = request_from("[::ffff:192.0.2.1]:1000")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            client_identity(&req, &TrustedProxyConfig::default()),
            "192.0.2.1"
        );
    }

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let everything = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(everything.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_trusted_proxy_config_skips_invalid() {
        let config = trusted(&["10.0.0.0/8", "garbage"]);
        assert!(config.is_enabled());
        assert!(config.is_trusted(&"10.9.9.9".parse().unwrap()));
        assert!(!config.is_trusted(&"8.8.8.8".parse().unwrap()));

        let empty = TrustedProxyConfig::default();
        assert!(!empty.is_enabled());
        assert!(!empty.is_trusted(&"10.9.9.9".parse().unwrap()));
    }
}
