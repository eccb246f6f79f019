//! One direction of a duplex relay.

use std::borrow::Cow;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::stream::CloseRead;

/// Default read buffer size for steady-state relaying.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Error raised by a chunk filter; ends the direction.
pub type FilterError = Box<dyn std::error::Error + Send + Sync>;

/// Per-chunk transform applied between read and write.
///
/// A filter may buffer across calls: it can emit nothing for a chunk and
/// more than one chunk's worth later.
///
/// A filter that fails part-way through a chunk returns the output produced
/// before the failure from [`filter`](ChunkFilter::filter) and reports the
/// failure through [`take_error`](ChunkFilter::take_error). The output is
/// written before the direction ends.
pub trait ChunkFilter: Send {
    fn filter<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError>;

    /// Failure raised while producing the last output, if any.
    fn take_error(&mut self) -> Option<FilterError> {
        None
    }
}

/// Copies bytes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ChunkFilter for Passthrough {
    fn filter<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError> {
        Ok(Cow::Borrowed(chunk))
    }
}

/// Why a direction stopped.
#[derive(Debug)]
pub enum RelayEnd {
    /// Source reached end of stream.
    Eof,
    Read(io::Error),
    Write(io::Error),
    Filter(FilterError),
}

impl RelayEnd {
    pub fn is_eof(&self) -> bool {
        matches!(self, RelayEnd::Eof)
    }
}

impl std::fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayEnd::Eof => write!(f, "end of stream"),
            RelayEnd::Read(e) => write!(f, "read failed: {}", e),
            RelayEnd::Write(e) => write!(f, "write failed: {}", e),
            RelayEnd::Filter(e) => write!(f, "filter failed: {}", e),
        }
    }
}

/// Summary of a finished direction.
#[derive(Debug)]
pub struct RelayReport {
    /// Bytes read from the source.
    pub bytes_read: u64,
    /// Bytes written to the destination (after filtering).
    pub bytes_written: u64,
    pub end: RelayEnd,
}

/// Retryable without application-level intervention.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Copy `src` into `dst` through `filter` until either side ends, then
/// half-close: the read side of `src` and the write side of `dst`.
pub async fn pipe<R, W, F>(src: &mut R, dst: &mut W, filter: &mut F, buffer_size: usize) -> RelayReport
where
    R: AsyncRead + CloseRead + Unpin,
    W: AsyncWrite + Unpin,
    F: ChunkFilter + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut bytes_read = 0u64;
    let mut bytes_written = 0u64;

    let end = loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break RelayEnd::Eof,
            Ok(n) => n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => break RelayEnd::Read(e),
        };
        bytes_read += n as u64;

        let out = match filter.filter(&buf[..n]) {
            Ok(out) => out,
            Err(e) => break RelayEnd::Filter(e),
        };

        if let Err(e) = write_all(dst, &out).await {
            break RelayEnd::Write(e);
        }
        bytes_written += out.len() as u64;

        if let Some(e) = filter.take_error() {
            break RelayEnd::Filter(e);
        }
    };

    if let Err(e) = src.close_read() {
        tracing::trace!(error = %e, "Read-side shutdown failed");
    }
    if let Err(e) = dst.shutdown().await {
        tracing::trace!(error = %e, "Write-side shutdown failed");
    }

    RelayReport {
        bytes_read,
        bytes_written,
        end,
    }
}

/// Write every byte, resuming from the acknowledged offset after partial
/// writes and transient errors.
pub async fn write_all<W>(dst: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < data.len() {
        match dst.write(&data[written..]).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Reader that replays a script, then reports EOF.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    impl CloseRead for ScriptedReader {
        fn close_read(&self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Writer that accepts at most `limit` bytes per call and fails every
    /// other call with a transient error.
    #[derive(Default)]
    struct StingyWriter {
        data: Vec<u8>,
        limit: usize,
        calls: usize,
        fail_with: Option<io::ErrorKind>,
        shut_down: bool,
    }

    impl AsyncWrite for StingyWriter {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.calls += 1;
            if let Some(kind) = self.fail_with {
                return Poll::Ready(Err(kind.into()));
            }
            if self.calls % 2 == 0 {
                return Poll::Ready(Err(io::ErrorKind::Interrupted.into()));
            }
            let n = buf.len().min(self.limit);
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shut_down = true;
            Poll::Ready(Ok(()))
        }
    }

    struct Upper;

    impl ChunkFilter for Upper {
        fn filter<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError> {
            Ok(Cow::Owned(chunk.to_ascii_uppercase()))
        }
    }

    struct Failing;

    impl ChunkFilter for Failing {
        fn filter<'a>(&mut self, _chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError> {
            Err("boom".into())
        }
    }

    #[tokio::test]
    async fn partial_and_interrupted_writes_resume_from_offset() {
        let mut src = ScriptedReader::new(vec![Ok(b"hello world".to_vec()), Ok(b"!".to_vec())]);
        let closed = src.closed.clone();
        let mut dst = StingyWriter {
            limit: 3,
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut Passthrough, 64).await;

        assert!(report.end.is_eof());
        assert_eq!(dst.data, b"hello world!");
        assert_eq!(report.bytes_read, 12);
        assert_eq!(report.bytes_written, 12);
        assert!(dst.shut_down);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transient_read_errors_are_retried() {
        let mut src = ScriptedReader::new(vec![
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"ab".to_vec()),
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(b"cd".to_vec()),
        ]);
        let mut dst = StingyWriter {
            limit: 16,
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut Passthrough, 64).await;
        assert!(report.end.is_eof());
        assert_eq!(dst.data, b"abcd");
    }

    #[tokio::test]
    async fn fatal_read_error_ends_direction_and_half_closes() {
        let mut src = ScriptedReader::new(vec![
            Ok(b"ab".to_vec()),
            Err(io::ErrorKind::ConnectionReset.into()),
            Ok(b"never".to_vec()),
        ]);
        let closed = src.closed.clone();
        let mut dst = StingyWriter {
            limit: 16,
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut Passthrough, 64).await;
        assert!(matches!(report.end, RelayEnd::Read(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert_eq!(dst.data, b"ab");
        assert!(dst.shut_down);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fatal_write_error_ends_direction() {
        let mut src = ScriptedReader::new(vec![Ok(b"ab".to_vec())]);
        let mut dst = StingyWriter {
            limit: 16,
            fail_with: Some(io::ErrorKind::BrokenPipe),
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut Passthrough, 64).await;
        assert!(matches!(report.end, RelayEnd::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert_eq!(report.bytes_written, 0);
    }

    #[tokio::test]
    async fn filter_output_is_written() {
        let mut src = ScriptedReader::new(vec![Ok(b"abc".to_vec())]);
        let mut dst = StingyWriter {
            limit: 16,
            ..Default::default()
        };

        pipe(&mut src, &mut dst, &mut Upper, 64).await;
        assert_eq!(dst.data, b"ABC");
    }

    #[tokio::test]
    async fn filter_error_ends_direction() {
        let mut src = ScriptedReader::new(vec![Ok(b"abc".to_vec()), Ok(b"def".to_vec())]);
        let mut dst = StingyWriter {
            limit: 16,
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut Failing, 64).await;
        assert!(matches!(report.end, RelayEnd::Filter(_)));
        assert_eq!(report.bytes_read, 3);
        assert!(dst.data.is_empty());
        assert!(dst.shut_down);
    }

    /// Emits its input, then fails once the input contains `!`.
    struct FailsAfterEmitting {
        failed: bool,
    }

    impl ChunkFilter for FailsAfterEmitting {
        fn filter<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError> {
            self.failed = chunk.contains(&b'!');
            Ok(Cow::Borrowed(chunk))
        }

        fn take_error(&mut self) -> Option<FilterError> {
            std::mem::take(&mut self.failed).then(|| "bang".into())
        }
    }

    #[tokio::test]
    async fn output_before_filter_failure_is_written() {
        let mut src = ScriptedReader::new(vec![Ok(b"ab".to_vec()), Ok(b"cd!".to_vec()), Ok(b"never".to_vec())]);
        let closed = src.closed.clone();
        let mut dst = StingyWriter {
            limit: 16,
            ..Default::default()
        };

        let report = pipe(&mut src, &mut dst, &mut FailsAfterEmitting { failed: false }, 64).await;
        assert!(matches!(report.end, RelayEnd::Filter(_)));
        assert_eq!(dst.data, b"abcd!");
        assert_eq!(report.bytes_written, 5);
        assert!(dst.shut_down);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn write_zero_is_fatal() {
        let mut dst = StingyWriter::default();
        let err = write_all(&mut dst, b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
