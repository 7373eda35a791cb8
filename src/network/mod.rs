//! Network layer for Chameleon
//!
//! Accept loop, backend client and shared HTTP helpers.

mod client;
mod connection_pool;
mod handler;
mod http;

pub use client::UpstreamClient;
pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use handler::NetworkHandler;
pub use http::{
    empty_body, full_body, is_hop_by_hop, strip_hop_by_hop, HttpHandler, ProxyBody,
    HOP_BY_HOP_HEADERS,
};

/// Backend connection setup timeout
pub const CONNECT_TIMEOUT_MS: u64 = 1000;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
