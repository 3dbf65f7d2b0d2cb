//! Socket endpoints
//!
//! A role either binds a local port and waits for peers, or connects out to a
//! peer that bound it. Both forms render as `tcp://host:port`.

use crate::error::Result;
use bridge_config::TransportSettings;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Where a socket role attaches to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Listen on a local address and accept any number of peers
    Bind(SocketAddr),
    /// Connect to a remote address, reconnecting whenever the link drops
    Connect(SocketAddr),
}

impl Endpoint {
    /// Bind endpoint on the configured bind host
    pub fn bind(settings: &TransportSettings, port: u16) -> Result<Self> {
        Ok(Endpoint::Bind(SocketAddr::new(settings.bind_ip()?, port)))
    }

    /// Connect endpoint for an explicit host
    pub fn connect(host: IpAddr, port: u16) -> Self {
        Endpoint::Connect(SocketAddr::new(host, port))
    }

    /// Connect endpoint on the configured peer host
    pub fn connect_peer(settings: &TransportSettings, port: u16) -> Result<Self> {
        Ok(Self::connect(settings.peer_ip()?, port))
    }

    pub fn address(&self) -> SocketAddr {
        match self {
            Endpoint::Bind(addr) | Endpoint::Connect(addr) => *addr,
        }
    }

    pub fn port(&self) -> u16 {
        self.address().port()
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, Endpoint::Bind(_))
    }

    /// Same endpoint with a different port, used after binding port 0
    pub(crate) fn with_port(self, port: u16) -> Self {
        match self {
            Endpoint::Bind(addr) => Endpoint::Bind(SocketAddr::new(addr.ip(), port)),
            Endpoint::Connect(addr) => Endpoint::Connect(SocketAddr::new(addr.ip(), port)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.address();
        match (self, addr.ip()) {
            (Endpoint::Bind(_), ip) if ip.is_unspecified() => write!(f, "tcp://*:{}", addr.port()),
            (_, IpAddr::V6(ip)) => write!(f, "tcp://[{}]:{}", ip, addr.port()),
            (_, IpAddr::V4(ip)) => write!(f, "tcp://{}:{}", ip, addr.port()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_bind_uses_configured_host() {
        let mut settings = TransportSettings::default();
        let endpoint = Endpoint::bind(&settings, 49200).unwrap();
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:49200");
        assert!(endpoint.is_bind());

        settings.bind_address = "*".to_string();
        let endpoint = Endpoint::bind(&settings, 49200).unwrap();
        assert_eq!(endpoint.to_string(), "tcp://*:49200");
    }

    #[test]
    fn test_connect_endpoint() {
        let endpoint = Endpoint::connect(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 25554);
        assert_eq!(endpoint.port(), 25554);
        assert!(!endpoint.is_bind());
        assert_eq!(endpoint.to_string(), "tcp://10.0.0.7:25554");
        assert_eq!(endpoint.with_port(1).port(), 1);
    }

    #[test]
    fn test_bad_host_is_configuration_error() {
        let settings = TransportSettings {
            bind_address: "nowhere".to_string(),
            ..TransportSettings::default()
        };
        let err = Endpoint::bind(&settings, 1).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
