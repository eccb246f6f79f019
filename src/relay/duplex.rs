//! Both directions of a connection pair, each on its own task.

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::lifecycle::supervisor::spawn_supervised;
use crate::observability::metrics;
use crate::relay::pipe::{pipe, ChunkFilter, Passthrough, RelayReport};

/// Relay direction, named from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client → upstream proxy
    Upstream,
    /// upstream proxy → client
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one direction to completion and log how it ended.
pub async fn run_direction<F>(
    direction: Direction,
    mut src: OwnedReadHalf,
    mut dst: OwnedWriteHalf,
    mut filter: F,
    buffer_size: usize,
) -> RelayReport
where
    F: ChunkFilter,
{
    let report = pipe(&mut src, &mut dst, &mut filter, buffer_size).await;
    metrics::record_relayed_bytes(direction.as_str(), report.bytes_written);

    if report.end.is_eof() {
        tracing::debug!(
            direction = %direction,
            bytes_read = report.bytes_read,
            bytes_written = report.bytes_written,
            "Relay direction finished"
        );
    } else {
        tracing::warn!(
            direction = %direction,
            bytes_read = report.bytes_read,
            bytes_written = report.bytes_written,
            reason = %report.end,
            "Relay direction aborted"
        );
    }
    report
}

/// Relay `client` ↔ `proxy` until both directions end.
///
/// `upstream_filter` is applied to client → proxy bytes; the other direction
/// is copied verbatim. Direction failures are logged, never returned.
pub async fn relay<F>(client: TcpStream, proxy: TcpStream, upstream_filter: F, buffer_size: usize)
where
    F: ChunkFilter + 'static,
{
    let (client_rd, client_wr) = client.into_split();
    let (proxy_rd, proxy_wr) = proxy.into_split();

    let downstream = spawn_supervised(
        "relay-downstream",
        run_direction(Direction::Downstream, proxy_rd, client_wr, Passthrough, buffer_size),
    );
    let upstream = spawn_supervised(
        "relay-upstream",
        run_direction(Direction::Upstream, client_rd, proxy_wr, upstream_filter, buffer_size),
    );

    let (down, up) = tokio::join!(downstream, upstream);
    for (direction, joined) in [(Direction::Downstream, down), (Direction::Upstream, up)] {
        if let Err(e) = joined {
            tracing::error!(direction = %direction, error = %e, "Relay task failed to join");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn relays_both_ways_and_finishes_after_both_close() {
        let (mut client, client_side) = tcp_pair().await;
        let (proxy_side, mut proxy) = tcp_pair().await;

        let handle = tokio::spawn(relay(client_side, proxy_side, Passthrough, 1024));

        client.write_all(b"123").await.unwrap();
        let mut buf = [0u8; 16];
        let n = proxy.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"123");

        proxy.write_all(b"456").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"456");

        // Client half-closes; proxy still sees EOF but can answer.
        client.shutdown().await.unwrap();
        assert_eq!(proxy.read(&mut buf).await.unwrap(), 0);
        proxy.write_all(b"late").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"late");

        proxy.shutdown().await.unwrap();
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);

        handle.await.unwrap();
    }
}
