//! The `host:port` a client originally addressed.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// Errors parsing a `host:port` string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationParseError {
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("empty host in {0:?}")]
    EmptyHost(String),
    #[error("invalid host in {0:?}")]
    InvalidHost(String),
}

/// Where the client intended to connect. Immutable once derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4.to_string(),
                None => v6.to_string(),
            },
            IpAddr::V4(v4) => v4.to_string(),
        };
        Self::new(host, addr.port())
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Destination {
    type Err = DestinationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DestinationParseError::MissingPort(s.to_string()))?;

        let host = match host.strip_prefix('[') {
            Some(inner) => inner
                .strip_suffix(']')
                .ok_or_else(|| DestinationParseError::InvalidHost(s.to_string()))?,
            None => host,
        };
        if host.contains(|c| c == '[' || c == ']') {
            return Err(DestinationParseError::InvalidHost(s.to_string()));
        }
        if host.is_empty() {
            return Err(DestinationParseError::EmptyHost(s.to_string()));
        }
        // Unbracketed IPv6 literals are ambiguous.
        if host.contains(':') && !s.starts_with('[') {
            return Err(DestinationParseError::MissingPort(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| DestinationParseError::InvalidPort(s.to_string()))?;

        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_host_port() {
        let d: Destination = "example.com:443".parse().unwrap();
        assert_eq!(d.host(), "example.com");
        assert_eq!(d.port(), 443);
        assert_eq!(d.to_string(), "example.com:443");
    }

    #[test]
    fn ipv6_is_bracketed() {
        let d: Destination = "[::1]:80".parse().unwrap();
        assert_eq!(d.host(), "::1");
        assert_eq!(d.to_string(), "[::1]:80");

        let from_addr = Destination::from("[2001:db8::1]:8443".parse::<SocketAddr>().unwrap());
        assert_eq!(from_addr.to_string(), "[2001:db8::1]:8443");
    }

    #[test]
    fn mapped_ipv4_is_unwrapped() {
        let addr: SocketAddr = "[::ffff:10.0.0.1]:80".parse().unwrap();
        assert_eq!(Destination::from(addr).to_string(), "10.0.0.1:80");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!("example.com".parse::<Destination>(), Err(DestinationParseError::MissingPort(_))));
        assert!(matches!("example.com:http".parse::<Destination>(), Err(DestinationParseError::InvalidPort(_))));
        assert!(matches!(":80".parse::<Destination>(), Err(DestinationParseError::EmptyHost(_))));
        assert!(matches!("::1:80".parse::<Destination>(), Err(DestinationParseError::MissingPort(_))));
        assert!(matches!("[::1:80".parse::<Destination>(), Err(DestinationParseError::InvalidHost(_))));
        assert!(matches!("::1]:80".parse::<Destination>(), Err(DestinationParseError::InvalidHost(_))));
        assert!(matches!("[::1]x:80".parse::<Destination>(), Err(DestinationParseError::InvalidHost(_))));
    }
}
