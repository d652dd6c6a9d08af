//! Public base URL resolution from request headers.
//!
//! Honors `x-forwarded-host` / `x-forwarded-proto` so the server can sit
//! behind a reverse proxy.

use axum::http::{HeaderMap, header};

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn is_loopback(host: &str) -> bool {
    let name = match host.find(']') {
        Some(end) => &host[..=end],
        None => host.split(':').next().unwrap_or(host),
    };
    matches!(name, "localhost" | "127.0.0.1" | "[::1]")
}

/// Resolve `proto://host` for the current request, without a trailing slash.
#[must_use]
pub fn resolve_base_url(headers: &HeaderMap, fallback_host: &str) -> String {
    let host = first_value(headers, "x-forwarded-host")
        .or_else(|| first_value(headers, header::HOST.as_str()))
        .unwrap_or(fallback_host);

    let proto = first_value(headers, "x-forwarded-proto")
        .unwrap_or(if is_loopback(host) { "http" } else { "https" });

    format!("{proto}://{}", host.trim_end_matches('/'))
}
