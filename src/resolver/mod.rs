//! Original-destination recovery for transparently redirected connections.
//!
//! # Data Flow
//! ```text
//! accepted client socket
//!     → forced destination configured?  → return it (no kernel lookup)
//!     → socket is TCP?                  → else NotTcp
//!     → method (auto picks per platform)
//!         netfilter.rs  getsockopt(SO_ORIGINAL_DST)      Linux
//!         pf.rs         ioctl(/dev/pf, DIOCNATLOOK)      macOS
//!         local-addr    socket's own local address       divert-style filters
//!     → Destination
//! ```
//!
//! # Design Decisions
//! - The debug override is injected configuration, never process state
//! - A missing NAT entry is per-connection and non-retryable

pub mod destination;
#[cfg(target_os = "linux")]
pub mod netfilter;
#[cfg(target_os = "macos")]
pub mod pf;

use std::io;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::ResolverConfig;
use crate::net::stream::Connection;

pub use destination::{Destination, DestinationParseError};

/// Errors recovering the original destination.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("socket is not tcp")]
    NotTcp,

    /// The connection was not redirected by the firewall.
    #[error("no redirect entry for connection: {0}")]
    NoRedirectEntry(#[source] io::Error),

    #[error("resolve method {0} is not supported on this platform")]
    Unsupported(ResolveMethod),

    #[error("destination lookup failed: {0}")]
    Io(#[source] io::Error),
}

impl ResolveError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ResolveError::NotTcp => "not_tcp",
            ResolveError::NoRedirectEntry(_) => "no_redirect_entry",
            ResolveError::Unsupported(_) => "unsupported",
            ResolveError::Io(_) => "io",
        }
    }
}

/// Kernel interface used to find the pre-NAT destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMethod {
    /// Netfilter on Linux, pf on macOS, local address elsewhere.
    #[default]
    Auto,
    Netfilter,
    Pf,
    LocalAddr,
}

impl ResolveMethod {
    /// Resolve `Auto` to the concrete method for this platform.
    pub fn for_platform(self) -> Self {
        match self {
            ResolveMethod::Auto if cfg!(target_os = "linux") => ResolveMethod::Netfilter,
            ResolveMethod::Auto if cfg!(target_os = "macos") => ResolveMethod::Pf,
            ResolveMethod::Auto => ResolveMethod::LocalAddr,
            other => other,
        }
    }
}

impl std::fmt::Display for ResolveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveMethod::Auto => write!(f, "auto"),
            ResolveMethod::Netfilter => write!(f, "netfilter"),
            ResolveMethod::Pf => write!(f, "pf"),
            ResolveMethod::LocalAddr => write!(f, "local-addr"),
        }
    }
}

/// Recovers where a redirected client meant to connect.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    method: ResolveMethod,
    forced: Option<Destination>,
}

impl Resolver {
    pub fn new(method: ResolveMethod) -> Self {
        Self { method, forced: None }
    }

    /// Always answer `destination`, bypassing the kernel.
    pub fn forced(destination: Destination) -> Self {
        Self {
            method: ResolveMethod::Auto,
            forced: Some(destination),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, DestinationParseError> {
        let forced = config
            .forced_destination
            .as_deref()
            .map(str::parse)
            .transpose()?;
        Ok(Self {
            method: config.method,
            forced,
        })
    }

    pub fn method(&self) -> ResolveMethod {
        self.method
    }

    pub fn forced_destination(&self) -> Option<&Destination> {
        self.forced.as_ref()
    }

    pub fn resolve(&self, conn: &Connection) -> Result<Destination, ResolveError> {
        if let Some(dst) = &self.forced {
            return Ok(dst.clone());
        }
        let stream = conn.as_tcp().ok_or(ResolveError::NotTcp)?;
        self.lookup(stream).map(Destination::from)
    }

    fn lookup(&self, stream: &TcpStream) -> Result<SocketAddr, ResolveError> {
        match self.method.for_platform() {
            #[cfg(target_os = "linux")]
            ResolveMethod::Netfilter => netfilter::original_dst(stream),
            #[cfg(target_os = "macos")]
            ResolveMethod::Pf => pf::original_dst(stream),
            ResolveMethod::LocalAddr => stream.local_addr().map_err(ResolveError::Io),
            other => Err(ResolveError::Unsupported(other)),
        }
    }
}
