//! Client identifier extraction.

use axum::http::HeaderMap;

/// Header set by reverse proxies with the originating client address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";
/// Header set by Cloudflare with the connecting client address.
pub const CONNECTING_IP: &str = "cf-connecting-ip";
/// Identifier used when neither header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the rate limit identifier for a request.
///
/// The first present header wins and its value is used as a whole, so a
/// proxy chain such as `"1.2.3.4, 10.0.0.1"` is its own identifier.
pub fn client_identifier(headers: &HeaderMap) -> String {
    [FORWARDED_FOR, CONNECTING_IP]
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
