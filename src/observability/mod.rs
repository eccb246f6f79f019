//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher / translators / relay directions produce:
//!     → logging.rs (structured events, one span per connection)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
