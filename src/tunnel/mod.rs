//! Tunnel clients
//!
//! This module provides the outbound tunnel clients: the SOCKS5 client state
//! machine, the HTTP CONNECT client, the TLS upgrade performed over an
//! established tunnel, and the multicast inbound byte channel.

pub mod http;
pub mod inbound;
pub mod socks5;
pub mod tls;

pub use http::HttpConnectTunnel;
pub use inbound::InboundSubscription;
pub use socks5::Socks5Tunnel;
pub use tls::TlsUpgrader;

use crate::config::TunnelConfig;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// Authentication method: no authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;

/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;

/// Address type: IPv4
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Address type: domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// Address type: IPv6
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

/// Reply code: succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length in a CONNECT request
pub const MAX_DOMAIN_LEN: usize = 255;

/// Default buffer size for inbound reads
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Lifecycle of one tunnel session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no handshake performed yet
    Unconnected,
    /// Greeting exchanged, no-auth accepted
    Greeted,
    /// CONNECT accepted, tunnel established
    Connected,
    /// TLS established over the tunnel
    Secured,
    /// A handshake or transport failure ended the session
    Failed,
    /// Closed by the caller
    Closed,
}

impl SessionState {
    /// Lowercase name for log fields and error messages
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Greeted => "greeted",
            SessionState::Connected => "connected",
            SessionState::Secured => "secured",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stream type a tunnel session can run over
///
/// Blanket-implemented for anything async-duplex, which keeps the session
/// generic over TCP, TLS-wrapped TCP, and in-memory test streams.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug + 'static> TunnelStream for T {}

/// Socket options applied to outbound proxy connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from tunnel config
    pub fn from_tunnel_config(config: &TunnelConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}
