//! Header policy for relayed traffic.
//!
//! # Responsibilities
//! - Name the headers a caller may never set through `auth.headerName`
//! - Name the upstream response headers never returned to the caller
//!
//! # Design Decisions
//! - Comparisons are ASCII case-insensitive (RFC 9110 field names)
//! - Hop-by-hop and forwarding headers are reserved alongside auth/framing ones

/// Headers the relay owns or that would alter framing/forwarding semantics.
pub const RESERVED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "authorization",
    "proxy-authorization",
    "proxy-authenticate",
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "upgrade",
    "cookie",
    "set-cookie",
    "forwarded",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
];

/// Upstream response headers stripped before replying.
pub const STRIPPED_RESPONSE_HEADERS: &[&str] = &["set-cookie"];

pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_REQUEST_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

pub fn is_stripped_response_header(name: &str) -> bool {
    STRIPPED_RESPONSE_HEADERS
        .iter()
        .any(|stripped| stripped.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_is_case_insensitive() {
        assert!(is_reserved_header("Authorization"));
        assert!(is_reserved_header("TRANSFER-ENCODING"));
        assert!(is_reserved_header(" host "));
        assert!(!is_reserved_header("X-API-Key"));
    }

    #[test]
    fn set_cookie_is_stripped() {
        assert!(is_stripped_response_header("Set-Cookie"));
        assert!(!is_stripped_response_header("content-type"));
    }
}
