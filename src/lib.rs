//! quilld - Quill XMPP Daemon
//!
//! The server-side stream runtime for RFC 6120: stream negotiation
//! (STARTTLS, SASL, resource binding), element dispatch, and the TCP
//! gateway. Protocol primitives live in the `quill-xmpp` crate.

pub mod config;
pub mod handlers;
pub mod network;
pub mod stream;
