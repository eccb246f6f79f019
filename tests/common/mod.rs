//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Answer the proxy gives to a successful CONNECT.
pub const CONNECT_OK: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

/// Two connected loopback TCP streams.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (connected.unwrap(), accepted.unwrap().0)
}

/// Sockets for driving a translator from both ends.
pub struct TranslatorSockets {
    /// Handed to the translator as its client.
    pub client_side: TcpStream,
    /// The test acting as the redirected client.
    pub client: TcpStream,
    /// Handed to the translator as its proxy.
    pub proxy_side: TcpStream,
    /// The test acting as the upstream proxy.
    pub proxy: TcpStream,
}

pub async fn translator_sockets() -> TranslatorSockets {
    let (client_side, client) = tcp_pair().await;
    let (proxy_side, proxy) = tcp_pair().await;
    TranslatorSockets {
        client_side,
        client,
        proxy_side,
        proxy,
    }
}

/// Read whatever arrives within `wait`; `None` when nothing did.
pub async fn read_within(stream: &mut TcpStream, wait: Duration) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(n)) => Some(buf[..n].to_vec()),
        Ok(Err(_)) | Err(_) => None,
    }
}

/// Read until `len` bytes have arrived.
pub async fn read_exact_len(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for data")
        .unwrap();
    buf
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a mock upstream proxy.
///
/// Every connection's first read is reported on the returned channel. A
/// first read starting with `CONNECT` is answered with [`CONNECT_OK`]; the
/// connection then echoes until the peer half-closes.
pub async fn start_mock_proxy() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                let first = buf[..n].to_vec();
                let is_connect = first.starts_with(b"CONNECT ");
                let _ = tx.send(first);
                if is_connect && socket.write_all(CONNECT_OK).await.is_err() {
                    return;
                }

                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}
