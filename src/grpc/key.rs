//! Caller key derivation for inbound requests.

use tonic::Request;
use tracing::warn;

use super::CheckRequest;

/// Derives the rate limit key for an inbound check.
pub trait KeyExtractor: Send + Sync {
    fn key(&self, request: &Request<CheckRequest>) -> String;
}

/// Keys callers by an explicit request key, else by peer IP address.
///
/// IPv4-mapped IPv6 peers from dual-stack listeners are keyed by their IPv4
/// address.
///
/// Callers with neither fall back to a fixed sentinel key, so all of them
/// share one bucket.
#[derive(Debug, Clone)]
pub struct PeerAddrKey {
    anonymous_key: String,
}

impl PeerAddrKey {
    pub fn new(anonymous_key: impl Into<String>) -> Self {
        Self {
            anonymous_key: anonymous_key.into(),
        }
    }
}

impl Default for PeerAddrKey {
    fn default() -> Self {
        Self::new("anonymous")
    }
}

impl KeyExtractor for PeerAddrKey {
    fn key(&self, request: &Request<CheckRequest>) -> String {
        let explicit = &request.get_ref().key;
        if !explicit.is_empty() {
            return explicit.clone();
        }

        match request.remote_addr() {
            Some(addr) => addr.ip().to_canonical().to_string(),
            None => {
                warn!(
                    anonymous_key = %self.anonymous_key,
                    "No peer address on request, using anonymous key"
                );
                self.anonymous_key.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tonic::transport::server::TcpConnectInfo;

    fn from_peer(peer: &str) -> Request<CheckRequest> {
        let mut request = Request::new(CheckRequest { key: String::new() });
        request.extensions_mut().insert(TcpConnectInfo {
            local_addr: None,
            remote_addr: Some(peer.parse::<SocketAddr>().unwrap()),
        });
        request
    }

    #[test]
    fn test_peer_ip_without_port() {
        let extractor = PeerAddrKey::default();
        assert_eq!(extractor.key(&from_peer("10.1.2.3:5555")), "10.1.2.3");
        assert_eq!(extractor.key(&from_peer("[2001:db8::1]:5555")), "2001:db8::1");
    }

    #[test]
    fn test_ipv4_mapped_peer_shares_ipv4_key() {
        let extractor = PeerAddrKey::default();
        assert_eq!(
            extractor.key(&from_peer("[::ffff:10.1.2.3]:5555")),
            extractor.key(&from_peer("10.1.2.3:6666"))
        );
    }

    #[test]
    fn test_explicit_key_wins() {
        let extractor = PeerAddrKey::default();
        let request = Request::new(CheckRequest {
            key: "tenant-42".to_string(),
        });
        assert_eq!(extractor.key(&request), "tenant-42");
    }

    #[test]
    fn test_missing_peer_falls_back_to_sentinel() {
        let extractor = PeerAddrKey::new("nobody");
        let request = Request::new(CheckRequest { key: String::new() });
        assert_eq!(extractor.key(&request), "nobody");
    }
}
