//! Fuzz testing for upstream URL derivation and credential extraction.
//!
//! Checks, for arbitrary trailing paths and query strings, that:
//!
//! - `build_upstream_url` never panics and keeps the `base/path` prefix
//! - no forwarded query pair decodes to the `api_key` name
//! - `api_key_from_query` never panics
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_upstream_url -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use github_proxy::auth::{API_KEY_QUERY, api_key_from_query};
use github_proxy::build_upstream_url;

const BASE: &str = "https://api.github.com";

#[derive(Debug, Arbitrary)]
struct Input {
    trailing_path: String,
    query: Option<String>,
}

fuzz_target!(|input: Input| {
    let query = input.query.as_deref();
    let url = build_upstream_url(BASE, &input.trailing_path, query);

    let prefix = format!("{BASE}/{}", input.trailing_path);
    assert!(url.starts_with(&prefix));

    if let Some(forwarded) = url[prefix.len()..].strip_prefix('?') {
        for (key, _) in url::form_urlencoded::parse(forwarded.as_bytes()) {
            assert_ne!(key, API_KEY_QUERY);
        }
    }

    let _ = api_key_from_query(query);
});
