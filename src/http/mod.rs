//! HTTP/1.x request framing.
//!
//! # Data Flow
//! ```text
//! client → proxy chunk
//!     → framer.rs (append to pending arena, find blank line)
//!     → request.rs (split request line + header fields)
//!     → [translator rewrites target to absolute form]
//!     → request.rs (re-serialize byte-for-byte)
//!     → framer.rs (hand out Content-Length bytes of body)
//!     → upstream proxy
//! ```
//!
//! # Design Decisions
//! - Content-Length framing only; no chunked encoding, no trailers
//! - One request in flight per direction; the next waits in the arena

pub mod framer;
pub mod request;

pub use framer::RequestFramer;
pub use request::{ParseError, RequestHeader};
