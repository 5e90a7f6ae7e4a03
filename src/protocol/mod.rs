//! Proxy Protocol Implementation
//!
//! HTTP and SOCKS5 handshakes, and the negotiator that picks between them.

pub mod constants;
pub mod http;
pub mod negotiator;
pub mod socks5;
pub mod types;

pub use constants::*;
pub use http::{HttpHandler, HttpRequest, HttpRoute};
pub use negotiator::{Negotiated, Negotiation, Negotiator};
pub use socks5::Socks5Handler;
pub use types::*;
