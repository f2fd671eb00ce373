//! Integration test common infrastructure.
//!
//! Provides an in-process test gateway, a raw XMPP test client, and
//! self-signed TLS assets for STARTTLS tests.

pub mod client;
pub mod server;
pub mod tls;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{RouteRecorder, TestServer};
