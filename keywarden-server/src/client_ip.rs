//! Client network-origin resolution behind edge proxies.

use axum::http::HeaderMap;
use std::net::SocketAddr;

const LOOPBACK: &str = "127.0.0.1";

/// Resolves the real client IP for clone detection and logging.
///
/// Priority: the edge proxy's `CF-Connecting-IP`, then the first hop of
/// `X-Forwarded-For`, then `X-Real-IP`, then the raw peer address.
/// Loopback header values are skipped (they mean the header was stamped by
/// a local proxy, not the client). Falls back to the literal `"unknown"`.
#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = header_value(headers, "cf-connecting-ip") {
        if ip != LOOPBACK {
            return ip;
        }
    }

    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(first_hop) = forwarded.split(',').next() {
            let first_hop = first_hop.trim();
            if !first_hop.is_empty() && first_hop != LOOPBACK {
                return first_hop.to_string();
            }
        }
    }

    if let Some(ip) = header_value(headers, "x-real-ip") {
        if ip != LOOPBACK {
            return ip;
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
