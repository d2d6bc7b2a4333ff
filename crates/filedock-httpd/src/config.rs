//! Server configuration.
//!
//! Everything the core needs (root, chunk size, secret) is carried here and
//! passed in at construction; there is no process-wide mutable state.

use filedock_core::ops::DEFAULT_CHUNK_SIZE;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Configuration for the filedock HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_address: IpAddr,
    /// Port to bind to (0 = auto-assign).
    pub port: u16,
    /// The single base directory all client paths resolve under.
    pub root: PathBuf,
    /// Shared signing secret; empty or absent disables verification.
    pub secret: Option<String>,
    /// Emit CORS headers on every response.
    pub cors_enabled: bool,
    /// Serve file contents for `GET ?file=` requests.
    pub file_serving: bool,
    /// Chunk size for copy and range streaming.
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0, // Auto-assign
            root: PathBuf::from("."),
            secret: None,
            cors_enabled: true,
            file_serving: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
