//! Client key derivation.

use std::net::{IpAddr, SocketAddr};

/// Identifies the client an admission budget belongs to.
///
/// Keys are derived from the peer IP only; the port changes per connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip())
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_is_ignored() {
        let a: SocketAddr = "192.168.1.1:50000".parse().unwrap();
        let b: SocketAddr = "192.168.1.1:50001".parse().unwrap();
        assert_eq!(ClientKey::from(a), ClientKey::from(b));
        assert_eq!(ClientKey::from(a).as_str(), "192.168.1.1");
    }

    #[test]
    fn test_ipv6_key() {
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(ClientKey::from(addr).to_string(), "::1");
    }
}
