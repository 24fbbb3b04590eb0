//! Client identity resolution
//!
//! The identity keys rate-limit counters. It is taken from the first entry of
//! `X-Forwarded-For` when a proxy supplied one, otherwise from the TCP peer.
//!
//! Trust boundary: `X-Forwarded-For` is client-controlled unless a trusted
//! proxy overwrites it, so a caller talking to the service directly can pick
//! its own identity.

use actix_web::dev::ServiceRequest;
use std::net::SocketAddr;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Identity used when neither the header nor the peer address is known
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client identity from raw request metadata
pub fn resolve_identity(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> String {
    if let Some(first) = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
    {
        return first.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Resolve the client identity for an inbound request
pub fn client_identity(req: &ServiceRequest) -> String {
    let forwarded_for = req
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|h| h.to_str().ok());

    resolve_identity(forwarded_for, req.peer_addr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn peer() -> Option<SocketAddr> {
        Some("198.51.100.7:54321".parse().unwrap())
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let identity = resolve_identity(Some(" 203.0.113.5 , 10.0.0.1, 10.0.0.2"), peer());
        assert_eq!(identity, "203.0.113.5");
    }

    #[test]
    fn test_single_forwarded_entry() {
        assert_eq!(resolve_identity(Some("203.0.113.5"), None), "203.0.113.5");
    }

    #[test]
    fn test_empty_header_falls_back_to_peer_ip() {
        assert_eq!(resolve_identity(Some(""), peer()), "198.51.100.7");
        assert_eq!(resolve_identity(Some("  , 10.0.0.1"), peer()), "198.51.100.7");
    }

    #[test]
    fn test_missing_header_uses_peer_without_port() {
        assert_eq!(resolve_identity(None, peer()), "198.51.100.7");
    }

    #[test]
    fn test_no_metadata_is_unknown() {
        assert_eq!(resolve_identity(None, None), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_from_service_request() {
        let req = TestRequest::get()
            .uri("/api/facts")
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .peer_addr("192.0.2.1:1000".parse().unwrap())
            .to_srv_request();
        assert_eq!(client_identity(&req), "203.0.113.9");

        let req = TestRequest::get()
            .uri("/api/facts")
            .peer_addr("192.0.2.1:1000".parse().unwrap())
            .to_srv_request();
        assert_eq!(client_identity(&req), "192.0.2.1");
    }
}
