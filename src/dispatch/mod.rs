//! Connection dispatch.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → one supervised task per client
//!         → dial upstream proxy (connect timeout)
//!         → Resolver::resolve (forced destination or kernel lookup)
//!         → ProtocolSelector (port 80 → Http, else Https)
//!         → Translator::start
//! ```
//!
//! # Design Decisions
//! - Per-connection failures are logged and the connection dropped; the
//!   accept loop never stops for them
//! - Resolver and protocol policy are injected, not global

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::lifecycle::supervisor::spawn_supervised;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::stream::Connection;
use crate::observability::metrics;
use crate::resolver::{DestinationParseError, Resolver};
use crate::translator::{protocol_for_port, ProtocolSelector, Session, Translator};

/// Accepts redirected connections and hands each to a translator.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    resolver: Arc<Resolver>,
    selector: ProtocolSelector,
    tracker: ConnectionTracker,
}

impl Dispatcher {
    /// Build from a validated configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, DestinationParseError> {
        let resolver = Resolver::from_config(&config.resolver)?;
        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            selector: protocol_for_port,
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the destination → protocol policy.
    pub fn with_protocol_selector(mut self, selector: ProtocolSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept until `shutdown` fires, then wait for in-flight connections.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        tracing::info!(
            upstream = %self.config.upstream.address,
            resolver = %self.resolver.method(),
            forced_destination = ?self.resolver.forced_destination().map(ToString::to_string),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_client(stream, peer, permit),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Dispatcher received shutdown signal, no longer accepting");
                    break;
                }
            }
        }

        let drain = Duration::from_secs(self.config.listener.drain_timeout_secs);
        if !self.tracker.wait_for_drain(drain).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Drain timeout elapsed with connections still open"
            );
        }
        Ok(())
    }

    fn spawn_client(&self, client: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        metrics::record_connection_accepted();
        let guard = self.tracker.track();
        let span = tracing::info_span!(
            "connection",
            id = %guard.id(),
            peer = %peer,
            destination = tracing::field::Empty
        );
        let this = self.clone();

        spawn_supervised(
            "connection",
            async move {
                this.handle_client(client).await;
                drop(guard);
                drop(permit);
            }
            .instrument(span),
        );
    }

    /// Run one client connection to completion.
    pub async fn handle_client(&self, client: TcpStream) {
        let timeout = Duration::from_secs(self.config.upstream.connect_timeout_secs);
        let upstream = &self.config.upstream.address;

        let proxy = match tokio::time::timeout(timeout, TcpStream::connect(upstream)).await {
            Ok(Ok(proxy)) => proxy,
            Ok(Err(e)) => {
                metrics::record_upstream_connect_failure();
                tracing::warn!(upstream = %upstream, error = %e, "failed to connect proxy");
                return;
            }
            Err(_) => {
                metrics::record_upstream_connect_failure();
                tracing::warn!(upstream = %upstream, timeout = ?timeout, "timed out connecting proxy");
                return;
            }
        };

        let client = Connection::from(client);
        let destination = match self.resolver.resolve(&client) {
            Ok(destination) => destination,
            Err(e) => {
                metrics::record_resolve_failure(e.reason());
                tracing::warn!(error = %e, "Dropping connection without destination");
                return;
            }
        };

        tracing::Span::current().record("destination", tracing::field::display(&destination));

        let protocol = (self.selector)(&destination);
        tracing::info!(protocol = %protocol, "Translating connection");

        let session = Session::new(client, proxy, destination).with_relay_config(self.config.relay.clone());
        if let Err(e) = Translator::new(protocol, session).start().await {
            tracing::error!(error = %e, "Translator failed");
        }
    }
}
