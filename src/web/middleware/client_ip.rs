//! Client identification from proxy headers.
//!
//! Priority: leftmost `X-Forwarded-For` entry (the original client as seen by
//! the first proxy) -> `X-Real-IP` -> the shared [`UNKNOWN_CLIENT`] bucket.
//!
//! Clients that arrive without either header all collapse into the same
//! identifier and therefore share one rate limit budget.

/// Identifier used when no forwarding header is present.
pub const UNKNOWN_CLIENT: &str = "unknown-client";

/// Resolve the rate limiting identifier for a request.
pub fn client_identifier(headers: &http::HeaderMap) -> String {
    if let Some(xff) = header_str(headers, "x-forwarded-for")
        && let Some(first) = xff.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return first.to_owned();
    }

    if let Some(real_ip) = header_str(headers, "x-real-ip").map(str::trim)
        && !real_ip.is_empty()
    {
        return real_ip.to_owned();
    }

    UNKNOWN_CLIENT.to_owned()
}

pub(crate) fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
