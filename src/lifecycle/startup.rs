//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics when enabled
//! - Bind the listener and build the dispatcher
//! - Wire termination signals to graceful shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::dispatch::Dispatcher;
use crate::lifecycle::signals::wait_for_termination;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};
use crate::resolver::DestinationParseError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid forced destination: {0}")]
    Destination(#[from] DestinationParseError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Run the proxy until a termination signal arrives.
///
/// `config` must already be validated.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => crate::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = Dispatcher::new(config.clone())?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers; shutting down"),
        }
        shutdown.trigger();
    });

    dispatcher.run(listener, receiver).await?;
    Ok(())
}
