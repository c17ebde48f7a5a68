//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::session::keepalive::MIN_PING_INTERVAL;
use crate::session::{KeepAlivePolicy, SessionConfig};

/// Largest inbound message accepted by default
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Handshake timeout (the upgrade must complete within this time)
    pub handshake_timeout: Duration,

    /// Probe cadence and idle timeout
    pub keepalive: KeepAlivePolicy,

    /// Upper bound for a single outbound write
    pub write_timeout: Duration,

    /// Frames that may queue per connection before it is dropped
    pub outbound_buffer: usize,

    /// Largest inbound message, in bytes
    pub max_message_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            keepalive: KeepAlivePolicy::default(),
            write_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the ping interval (at least 1ms)
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.keepalive.ping_interval = interval.max(MIN_PING_INTERVAL);
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive.idle_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the per-connection queue depth (at least 1)
    pub fn outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    /// Set the inbound message size limit
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// The part of the configuration each session runs with
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            keepalive: self.keepalive,
            write_timeout: self.write_timeout,
            outbound_buffer: self.outbound_buffer,
        }
    }
}
