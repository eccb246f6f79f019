//! CONNECT tunnel translation.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::request::{find, EOL};
use crate::net::stream::check_sockets;
use crate::observability::metrics;
use crate::relay::duplex::relay;
use crate::relay::pipe::{is_transient, write_all, Passthrough};
use crate::resolver::Destination;
use crate::translator::{Session, TranslateError};

/// CONNECT negotiation with the upstream proxy failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to write at CONNECT: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read at CONNECT: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to read at CONNECT: EOF")]
    Eof,

    /// The proxy answered with something other than `200`.
    #[error("error response at CONNECT request: {response}")]
    Rejected { response: String },
}

/// The literal tunnel request, no extra headers.
pub fn connect_request(destination: &Destination) -> String {
    format!("CONNECT {} HTTP/1.1\r\n\r\n", destination)
}

/// Second token of the status line is exactly `200`. Only CRLF ends the
/// status line.
pub fn is_connect_succeeded(response: &[u8]) -> bool {
    let status_line = match find(response, EOL) {
        Some(pos) => &response[..pos],
        None => response,
    };
    status_line.split(|b| *b == b' ').nth(1) == Some(&b"200"[..])
}

/// Send CONNECT and check a single bounded read of the answer.
pub async fn handshake<S>(proxy: &mut S, destination: &Destination, buffer_size: usize) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_all(proxy, connect_request(destination).as_bytes())
        .await
        .map_err(HandshakeError::Write)?;

    let mut buf = vec![0u8; buffer_size.max(1)];
    let n = loop {
        match proxy.read(&mut buf).await {
            Ok(0) => return Err(HandshakeError::Eof),
            Ok(n) => break n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => return Err(HandshakeError::Read(e)),
        }
    };

    let response = &buf[..n];
    if is_connect_succeeded(response) {
        Ok(())
    } else {
        Err(HandshakeError::Rejected {
            response: String::from_utf8_lossy(response).into_owned(),
        })
    }
}

/// Translator tunnelling opaque traffic through CONNECT.
#[derive(Debug)]
pub struct HttpsTranslator {
    session: Session,
}

impl HttpsTranslator {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn start(self) -> Result<(), TranslateError> {
        let Session {
            client,
            proxy,
            destination,
            relay: relay_config,
        } = self.session;
        let (client, mut proxy) = check_sockets(client, proxy)?;

        if let Err(e) = handshake(&mut proxy, &destination, relay_config.handshake_buffer_size).await {
            metrics::record_handshake_failure();
            return Err(e.into());
        }

        tracing::debug!(destination = %destination, "CONNECT tunnel established");
        relay(client, proxy, Passthrough, relay_config.buffer_size).await;
        Ok(())
    }
}
