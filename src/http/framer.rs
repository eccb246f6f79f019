//! Incremental request framing over an arbitrarily segmented byte stream.
//!
//! Bytes arrive in chunks whose boundaries have nothing to do with message
//! boundaries. The framer accumulates them and hands out at most one header
//! at a time, followed by exactly `Content-Length` bytes of body.

use crate::http::request::{find, ParseError, RequestHeader, EOH};

/// Compact the arena once the consumed prefix is at least this large and
/// outweighs the live bytes.
const COMPACT_THRESHOLD: usize = 8 * 1024;

/// Pending-byte arena for one filtered direction.
#[derive(Debug, Default)]
pub struct RequestFramer {
    buf: Vec<u8>,
    /// Start of unconsumed bytes.
    start: usize,
    /// Offset (absolute) below which no terminator can begin.
    scanned: usize,
}

impl RequestFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read off the wire.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(bytes);
    }

    /// Unconsumed bytes.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.buf.len()
    }

    /// Consume and parse a complete header block if one is buffered.
    ///
    /// Returns `Ok(None)` and leaves the buffer untouched when the blank-line
    /// delimiter has not arrived yet.
    pub fn try_extract_header(&mut self) -> Result<Option<RequestHeader>, ParseError> {
        let from = self.scanned.max(self.start);
        let Some(pos) = find(&self.buf[from..], EOH) else {
            // The last EOH.len() - 1 bytes may be the start of a split terminator.
            self.scanned = self.buf.len().saturating_sub(EOH.len() - 1).max(self.start);
            return Ok(None);
        };

        let boundary = from + pos + EOH.len();
        let block = &self.buf[self.start..boundary];
        let header = RequestHeader::parse(block);

        self.start = boundary;
        self.scanned = boundary;
        header.map(Some)
    }

    /// Take up to `header.remaining_body()` buffered bytes as body.
    pub fn consume_body(&mut self, header: &mut RequestHeader) -> Vec<u8> {
        let take = header.remaining_body().min(self.buf.len() - self.start);
        let body = self.buf[self.start..self.start + take].to_vec();

        self.start += take;
        self.scanned = self.scanned.max(self.start);
        header.body_read += take;
        body
    }

    fn compact(&mut self) {
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
            self.scanned = 0;
        } else if self.start >= COMPACT_THRESHOLD && self.start > self.buf.len() - self.start {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
    }
}
