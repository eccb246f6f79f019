//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Redirected TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection ID, drain tracking)
//!     → stream.rs (socket-type guard, read-side half-close)
//!     → Hand off to the dispatcher
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod stream;
