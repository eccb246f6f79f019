//! Per-connection protocol translation.
//!
//! # Data Flow
//! ```text
//! (client socket, upstream socket, destination)
//!     → check_sockets (both must be TCP, before any I/O)
//!     → Http:  client → framer → rewrite target → upstream
//!              upstream → client verbatim
//!     → Https: CONNECT <destination> → expect 200 → opaque relay both ways
//!     → Ok(()) once both directions have ended
//! ```
//!
//! # Design Decisions
//! - The variant is chosen by the caller; the port heuristic lives in
//!   [`protocol_for_port`] and can be swapped for another [`ProtocolSelector`]
//! - Only setup failures are returned; relay failures are logged per direction

pub mod http;
pub mod https;

use thiserror::Error;

use crate::config::RelayConfig;
use crate::net::stream::{Connection, NotTcp};
use crate::resolver::Destination;

pub use self::http::{HttpRequestFilter, HttpTranslator};
pub use self::https::{HandshakeError, HttpsTranslator};

/// Errors that stop a translator before relaying starts.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    NotTcp(#[from] NotTcp),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Which translation a destination gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain HTTP: rewrite request targets, forward as proxy requests.
    Http,
    /// Anything else: tunnel through `CONNECT`.
    Https,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// Policy mapping a destination to a translation.
pub type ProtocolSelector = fn(&Destination) -> Protocol;

/// Port 80 is plain HTTP; every other port is assumed to carry TLS.
pub fn protocol_for_port(destination: &Destination) -> Protocol {
    if destination.port() == 80 {
        Protocol::Http
    } else {
        Protocol::Https
    }
}

/// Everything a translator owns for one proxied connection.
#[derive(Debug)]
pub struct Session {
    pub client: Connection,
    pub proxy: Connection,
    pub destination: Destination,
    pub relay: RelayConfig,
}

impl Session {
    pub fn new(client: impl Into<Connection>, proxy: impl Into<Connection>, destination: Destination) -> Self {
        Self {
            client: client.into(),
            proxy: proxy.into(),
            destination,
            relay: RelayConfig::default(),
        }
    }

    pub fn with_relay_config(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }
}

/// A translator for one connection pair.
#[derive(Debug)]
pub enum Translator {
    Http(HttpTranslator),
    Https(HttpsTranslator),
}

impl Translator {
    pub fn new(protocol: Protocol, session: Session) -> Self {
        match protocol {
            Protocol::Http => Translator::Http(HttpTranslator::new(session)),
            Protocol::Https => Translator::Https(HttpsTranslator::new(session)),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Translator::Http(_) => Protocol::Http,
            Translator::Https(_) => Protocol::Https,
        }
    }

    /// Drive the session until both relay directions end.
    pub async fn start(self) -> Result<(), TranslateError> {
        match self {
            Translator::Http(t) => t.start().await,
            Translator::Https(t) => t.start().await,
        }
    }
}
