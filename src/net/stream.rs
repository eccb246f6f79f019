//! Stream sockets handed to the translation layer.
//!
//! The dispatcher only ever produces TCP streams, but the translation layer
//! accepts any stream socket and refuses non-TCP ones before touching them.

use std::io;
use std::net::Shutdown;

use socket2::SockRef;
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// Which side of a connection pair a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Client,
    Proxy,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Client => write!(f, "client"),
            Peer::Proxy => write!(f, "proxy"),
        }
    }
}

/// The supplied socket is not a byte-stream TCP connection.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0} socket is not tcp")]
pub struct NotTcp(pub Peer);

/// A connected stream socket of any supported transport.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    pub fn as_tcp(&self) -> Option<&TcpStream> {
        match self {
            Connection::Tcp(stream) => Some(stream),
            #[cfg(unix)]
            Connection::Unix(_) => None,
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.as_tcp().is_some()
    }

    /// Unwrap the TCP stream or report which peer was not TCP.
    #[cfg_attr(not(unix), allow(unused_variables))]
    pub fn into_tcp(self, peer: Peer) -> Result<TcpStream, NotTcp> {
        match self {
            Connection::Tcp(stream) => Ok(stream),
            #[cfg(unix)]
            Connection::Unix(_) => Err(NotTcp(peer)),
        }
    }
}

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Connection::Tcp(stream)
    }
}

#[cfg(unix)]
impl From<UnixStream> for Connection {
    fn from(stream: UnixStream) -> Self {
        Connection::Unix(stream)
    }
}

/// Check both sockets of a pair before any I/O happens on either.
pub fn check_sockets(client: Connection, proxy: Connection) -> Result<(TcpStream, TcpStream), NotTcp> {
    if !client.is_tcp() {
        return Err(NotTcp(Peer::Client));
    }
    if !proxy.is_tcp() {
        return Err(NotTcp(Peer::Proxy));
    }
    Ok((client.into_tcp(Peer::Client)?, proxy.into_tcp(Peer::Proxy)?))
}

/// Read-side half-close.
///
/// Tokio's owned halves only expose write shutdown; the read side is shut
/// down directly on the socket.
pub trait CloseRead {
    fn close_read(&self) -> io::Result<()>;
}

impl CloseRead for OwnedReadHalf {
    fn close_read(&self) -> io::Result<()> {
        let stream: &TcpStream = self.as_ref();
        SockRef::from(stream).shutdown(Shutdown::Read)
    }
}

impl CloseRead for TcpStream {
    fn close_read(&self) -> io::Result<()> {
        SockRef::from(self).shutdown(Shutdown::Read)
    }
}
