//! Duplex byte relay.
//!
//! # Data Flow
//! ```text
//! client socket ──read──▶ [filter] ──write──▶ upstream socket   (Upstream)
//! client socket ◀─write── ─────────── ◀─read── upstream socket   (Downstream)
//! ```
//!
//! # Design Decisions
//! - Each direction is its own supervised task; neither knows about HTTP
//! - Transient errors retry in place; anything else ends that direction only
//! - Ending a direction half-closes it, leaving the other direction usable

pub mod duplex;
pub mod pipe;

pub use duplex::{relay, Direction};
pub use pipe::{pipe, ChunkFilter, FilterError, Passthrough, RelayEnd, RelayReport};
