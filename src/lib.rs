//! Transparent TCP intercepting proxy library.
//!
//! Connections redirected here by the firewall are forwarded through an
//! upstream HTTP proxy: plain HTTP has its request targets rewritten to
//! absolute form, everything else is tunnelled with `CONNECT`.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resolver;
pub mod translator;

pub use config::schema::ProxyConfig;
pub use dispatch::Dispatcher;
pub use lifecycle::Shutdown;
pub use resolver::{Destination, Resolver};
pub use translator::{Protocol, Session, TranslateError, Translator};
