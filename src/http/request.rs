//! Parsed HTTP/1.x request header.
//!
//! # Responsibilities
//! - Split a complete header block into request-line tokens and header fields
//! - Track declared vs. delivered body length (Content-Length framing only)
//! - Re-serialize byte-for-byte so untouched fields stay identical on the wire
//!
//! # Design Decisions
//! - Fields are kept as raw bytes: names and values are never normalized
//! - Lines that do not split on `": "` are dropped, not rejected
//! - A bad Content-Length is a hard error; a missing one means no body

use thiserror::Error;

/// Line terminator.
pub const EOL: &[u8] = b"\r\n";

/// End-of-header delimiter (blank line).
pub const EOH: &[u8] = b"\r\n\r\n";

const HEADER_SEPARATOR: &[u8] = b": ";

/// Errors raised while parsing a header block.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Content-Length value is not a non-negative integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
}

/// One HTTP request's start line and header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    /// Request-line tokens, normally `[method, target, version]`.
    pub request_line: Vec<Vec<u8>>,
    /// Header fields in wire order, casing preserved.
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    /// Declared body length.
    pub body_size: usize,
    /// Body bytes handed out so far.
    pub body_read: usize,
}

impl RequestHeader {
    /// Parse a header block. The block may or may not include the trailing
    /// blank line; empty lines are ignored either way.
    pub fn parse(block: &[u8]) -> Result<Self, ParseError> {
        let mut lines = split_on(block, EOL).into_iter();

        let request_line = lines
            .next()
            .map(|line| line.split(|b| *b == b' ').map(<[u8]>::to_vec).collect())
            .unwrap_or_default();

        let mut headers = Vec::new();
        let mut body_size = 0;

        for line in lines {
            let Some(pos) = find(line, HEADER_SEPARATOR) else {
                continue;
            };
            let name = &line[..pos];
            let value = &line[pos + HEADER_SEPARATOR.len()..];

            if name.eq_ignore_ascii_case(b"content-length") {
                body_size = parse_content_length(value)?;
            }
            headers.push((name.to_vec(), value.to_vec()));
        }

        Ok(Self {
            request_line,
            headers,
            body_size,
            body_read: 0,
        })
    }

    /// Serialize back to wire form, terminated by the blank line.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.request_line();
        for (name, value) in &self.headers {
            out.extend_from_slice(EOL);
            out.extend_from_slice(name);
            out.extend_from_slice(HEADER_SEPARATOR);
            out.extend_from_slice(value);
        }
        out.extend_from_slice(EOH);
        out
    }

    /// Request line with tokens rejoined by single spaces.
    pub fn request_line(&self) -> Vec<u8> {
        self.request_line.join(&b' ')
    }

    pub fn method(&self) -> Option<&[u8]> {
        self.request_line.first().map(Vec::as_slice)
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.request_line.get(1).map(Vec::as_slice)
    }

    /// Replace the request target. Returns false when the request line has
    /// no target token to replace.
    pub fn set_target(&mut self, target: impl Into<Vec<u8>>) -> bool {
        match self.request_line.get_mut(1) {
            Some(slot) => {
                *slot = target.into();
                true
            }
            None => false,
        }
    }

    /// First header value whose name matches case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v.as_slice())
    }

    /// Body bytes still expected.
    pub fn remaining_body(&self) -> usize {
        self.body_size - self.body_read
    }

    pub fn is_completed(&self) -> bool {
        self.body_read == self.body_size
    }
}

fn parse_content_length(value: &[u8]) -> Result<usize, ParseError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ParseError::InvalidContentLength(String::from_utf8_lossy(value).into_owned()))
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split_on<'a>(mut input: &'a [u8], sep: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    while let Some(pos) = find(input, sep) {
        parts.push(&input[..pos]);
        input = &input[pos + sep.len()..];
    }
    parts.push(input);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(r: &RequestHeader) -> Vec<&str> {
        r.request_line
            .iter()
            .map(|t| std::str::from_utf8(t).unwrap())
            .collect()
    }

    #[test]
    fn parses_request_line_and_headers() {
        let r = RequestHeader::parse(b"GET / HTTP/1.1\r\nHead1: 1\r\nHead2: 2\r\n\r\n").unwrap();
        assert_eq!(tokens(&r), vec!["GET", "/", "HTTP/1.1"]);
        assert_eq!(
            r.headers,
            vec![
                (b"Head1".to_vec(), b"1".to_vec()),
                (b"Head2".to_vec(), b"2".to_vec()),
            ]
        );
        assert_eq!(r.body_size, 0);
        assert!(r.is_completed());
    }

    #[test]
    fn content_length_is_case_insensitive() {
        let r = RequestHeader::parse(b"POST /x HTTP/1.1\r\ncOnTeNt-LeNgTh: 2\r\n\r\n").unwrap();
        assert_eq!(r.body_size, 2);
        assert_eq!(r.remaining_body(), 2);
        assert!(!r.is_completed());
    }

    #[test]
    fn invalid_content_length_is_an_error() {
        let err = RequestHeader::parse(b"GET / HTTP/1.1\r\nContent-Length: XXX\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength(ref v) if v == "XXX"));

        let err = RequestHeader::parse(b"GET / HTTP/1.1\r\nContent-Length: -1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength(_)));
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let r = RequestHeader::parse(b"GET / HTTP/1.1\r\nA: 1\r\ngarbage\r\nB:2\r\n\r\n").unwrap();
        assert_eq!(r.headers.len(), 1);
        assert_eq!(r.header("a"), Some(&b"1"[..]));
    }

    #[test]
    fn value_keeps_everything_after_first_separator() {
        let r = RequestHeader::parse(b"GET / HTTP/1.1\r\nX-Time: 10: 30\r\n\r\n").unwrap();
        assert_eq!(r.header("x-time"), Some(&b"10: 30"[..]));
    }

    #[test]
    fn round_trips_well_formed_headers() {
        let raw: &[u8] = b"POST /submit?q=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: curl/8.0\r\nContent-Length: 3\r\nX-MiXeD-CaSe: Keep Me\r\n\r\n";
        let r = RequestHeader::parse(raw).unwrap();
        assert_eq!(r.to_bytes(), raw);
    }

    #[test]
    fn request_line_reflects_new_target() {
        let mut r = RequestHeader::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(r.request_line(), b"GET / HTTP/1.0");

        assert!(r.set_target("http://example.com/"));
        assert_eq!(r.request_line(), b"GET http://example.com/ HTTP/1.0");
        assert_eq!(r.to_bytes(), b"GET http://example.com/ HTTP/1.0\r\n\r\n");
    }

    #[test]
    fn short_request_line_has_no_target() {
        let mut r = RequestHeader::parse(b"test\r\n\r\n").unwrap();
        assert_eq!(r.method(), Some(&b"test"[..]));
        assert_eq!(r.target(), None);
        assert!(!r.set_target("/"));
    }
}
