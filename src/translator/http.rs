//! Plain HTTP translation.
//!
//! Requests arriving from a transparently redirected client carry
//! origin-form targets (`GET /path`). An HTTP proxy needs absolute-form
//! (`GET http://host/path`), so every request header passing client → proxy
//! has its target rewritten. Bodies and responses pass through untouched.

use std::borrow::Cow;

use crate::http::{ParseError, RequestFramer, RequestHeader};
use crate::net::stream::check_sockets;
use crate::observability::metrics;
use crate::relay::duplex::relay;
use crate::relay::pipe::{ChunkFilter, FilterError};
use crate::resolver::Destination;
use crate::translator::{Session, TranslateError};

/// Filtered-direction state.
#[derive(Debug)]
enum FilterState {
    AwaitingHeader,
    InBody(RequestHeader),
    /// A malformed header was seen; nothing more is framed.
    Failed,
}

/// Client → proxy filter that rewrites each request's target.
#[derive(Debug)]
pub struct HttpRequestFilter {
    framer: RequestFramer,
    state: FilterState,
    destination: Destination,
    failure: Option<ParseError>,
}

impl HttpRequestFilter {
    pub fn new(destination: Destination) -> Self {
        Self {
            framer: RequestFramer::new(),
            state: FilterState::AwaitingHeader,
            destination,
            failure: None,
        }
    }

    /// True while a request body is still expected.
    pub fn in_body(&self) -> bool {
        matches!(self.state, FilterState::InBody(_))
    }

    /// Feed one chunk and return everything that can be emitted now.
    ///
    /// A malformed header stops framing for good: the requests completed
    /// before it are still returned, and the error is left for
    /// [`take_error`](Self::take_error). Later chunks produce nothing.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        if matches!(self.state, FilterState::Failed) {
            return out;
        }
        self.framer.feed(chunk);

        loop {
            match &mut self.state {
                FilterState::AwaitingHeader => {
                    let mut header = match self.framer.try_extract_header() {
                        Ok(Some(header)) => header,
                        Ok(None) => break,
                        Err(e) => {
                            self.failure = Some(e);
                            self.state = FilterState::Failed;
                            break;
                        }
                    };
                    rewrite_target(&mut header, &self.destination);
                    out.extend_from_slice(&header.to_bytes());
                    self.state = FilterState::InBody(header);
                }
                FilterState::InBody(header) => {
                    out.extend_from_slice(&self.framer.consume_body(header));
                    if !header.is_completed() {
                        break;
                    }
                    tracing::info!(
                        request = %String::from_utf8_lossy(&header.request_line()),
                        "Request forwarded"
                    );
                    metrics::record_request(header.method().unwrap_or_default());
                    self.state = FilterState::AwaitingHeader;
                }
                FilterState::Failed => break,
            }
        }
        out
    }

    /// The header error that stopped framing, once.
    pub fn take_error(&mut self) -> Option<ParseError> {
        self.failure.take()
    }
}

impl ChunkFilter for HttpRequestFilter {
    fn filter<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, FilterError> {
        Ok(Cow::Owned(self.process(chunk)))
    }

    fn take_error(&mut self) -> Option<FilterError> {
        HttpRequestFilter::take_error(self).map(Into::into)
    }
}

/// Rewrite an origin-form target to `http://<host><target>`.
///
/// The host comes from the `Host` header, or the resolved destination when
/// the request has none. Targets already in another form are left alone.
pub fn rewrite_target(header: &mut RequestHeader, destination: &Destination) {
    let Some(target) = header.target() else {
        tracing::warn!(
            request = %String::from_utf8_lossy(&header.request_line()),
            "Request line has no target; forwarding unchanged"
        );
        return;
    };
    if !target.starts_with(b"/") {
        return;
    }

    let mut uri = b"http://".to_vec();
    match header.header("host") {
        Some(host) => uri.extend_from_slice(host),
        None => uri.extend_from_slice(destination.to_string().as_bytes()),
    }
    uri.extend_from_slice(target);
    header.set_target(uri);
}

/// Translator for port-80 style traffic.
#[derive(Debug)]
pub struct HttpTranslator {
    session: Session,
}

impl HttpTranslator {
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
        let (client, proxy) = check_sockets(client, proxy)?;

        tracing::debug!(destination = %destination, "Relaying plain HTTP");
        let filter = HttpRequestFilter::new(destination);
        relay(client, proxy, filter, relay_config.buffer_size).await;
        Ok(())
    }
}
