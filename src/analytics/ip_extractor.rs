//! Client address extraction from proxy headers
//!
//! Resolution order:
//! - `CF-Connecting-IP` (Cloudflare)
//! - `X-Real-IP`
//! - first entry of `X-Forwarded-For`
//! - the transport peer address
//!
//! The result is normalized: IPv4-mapped IPv6 prefixes are stripped and
//! loopback forms collapse to [`LOCAL_DEV`].

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Placeholder substituted for loopback addresses before geolocation
pub const LOCAL_DEV: &str = "local-dev";

const IPV4_MAPPED_PREFIX: &str = "::ffff:";
const LOOPBACK_FORMS: &[&str] = &["::1", "127.0.0.1", "localhost"];

/// Extract a best-effort client address. Never fails; may return an empty string
/// when neither headers nor a peer address are available.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let raw = header_value(headers, "cf-connecting-ip")
        .or_else(|| header_value(headers, "x-real-ip"))
        .or_else(|| first_forwarded_for(headers))
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_default();

    normalize_address(&raw)
}

/// Strip an IPv4-mapped prefix and map loopback forms to [`LOCAL_DEV`]
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let addr = trimmed.strip_prefix(IPV4_MAPPED_PREFIX).unwrap_or(trimmed);

    if is_loopback(addr) {
        LOCAL_DEV.to_string()
    } else {
        addr.to_string()
    }
}

/// True for the sentinel and every literal loopback form
pub fn is_local(addr: &str) -> bool {
    addr.is_empty() || addr == LOCAL_DEV || is_loopback(addr)
}

fn is_loopback(addr: &str) -> bool {
    LOOPBACK_FORMS.contains(&addr)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// X-Forwarded-For lists the originating client first
fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
