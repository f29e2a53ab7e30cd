//! SOCKS5 tunnel client
//!
//! Implements the client side of the SOCKS5 greeting and CONNECT exchange
//! (RFC 1928, domain-name addressing, no-auth only), an optional TLS upgrade
//! over the established tunnel, and a duplex byte interface for the tunneled
//! session.
//!
//! The session is a state machine: `Unconnected → Greeted → Connected →
//! Secured`, with `Failed` and `Closed` as exits. Request/response exchanges
//! are strictly sequential; operations invoked from the wrong state are
//! rejected with [`SocksError::InvalidState`] instead of corrupting the
//! protocol stream.

use super::inbound::{InboundHub, InboundSubscription};
use super::tls::TlsUpgrader;
use super::{
    SessionState, SocketOpts, TunnelStream, MAX_DOMAIN_LEN, SOCKS5_ADDR_TYPE_DOMAIN,
    SOCKS5_ADDR_TYPE_IPV4, SOCKS5_ADDR_TYPE_IPV6, SOCKS5_AUTH_METHOD_NONE,
    SOCKS5_CMD_TCP_CONNECT, SOCKS5_REPLY_SUCCEEDED, SOCKS5_RESERVED, SOCKS5_VERSION,
};
use crate::error::{ReplyCode, SocksError};
use crate::proxy::Endpoint;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// SOCKS5 tunnel session
///
/// Owns its transport exclusively; a session is never shared between
/// clients. A failed handshake is fatal for the session: create a new one to
/// retry.
pub struct Socks5Tunnel {
    state: SessionState,
    /// Whole-stream transport, present until the first subscription splits it
    transport: Option<Box<dyn TunnelStream>>,
    /// Write half, present after the split
    writer: Option<WriteHalf<Box<dyn TunnelStream>>>,
    inbound: Option<InboundHub>,
    tls: Option<TlsUpgrader>,
}

impl Socks5Tunnel {
    /// Create a session over an already-connected stream
    pub fn new<S: TunnelStream>(stream: S) -> Self {
        Socks5Tunnel {
            state: SessionState::Unconnected,
            transport: Some(Box::new(stream)),
            writer: None,
            inbound: None,
            tls: None,
        }
    }

    /// Request a TLS upgrade once the tunnel is established
    ///
    /// The handshake runs inside [`Socks5Tunnel::connect_to`], right after
    /// the CONNECT succeeds, and verifies the remote identity against the
    /// target domain.
    pub fn with_tls(mut self, upgrader: TlsUpgrader) -> Self {
        self.tls = Some(upgrader);
        self
    }

    /// Open a TCP connection to a SOCKS5 proxy endpoint
    pub async fn open(
        proxy: &Endpoint,
        opts: &SocketOpts,
        connect_timeout: Duration,
    ) -> Result<Self, SocksError> {
        let addr = (proxy.host.as_str(), proxy.port);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                SocksError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Connection to proxy {} timed out", proxy),
                ))
            })??;

        opts.apply(&stream)?;
        debug!(proxy = %proxy, "Connected to SOCKS5 proxy");

        Ok(Self::new(stream))
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Perform the greeting exchange
    ///
    /// Sends the 3-byte greeting offering only the no-auth method and awaits
    /// the 2-byte reply. On success the session moves to `Greeted`; a proxy
    /// that insists on authentication fails the session with
    /// [`SocksError::AuthNegotiationFailed`].
    pub async fn handshake(&mut self) -> Result<(), SocksError> {
        self.expect_state(SessionState::Unconnected, "handshake")?;
        let stream = self.transport_mut("handshake")?;

        match exchange_greeting(stream).await {
            Ok(()) => {
                self.state = SessionState::Greeted;
                debug!("SOCKS5 greeting accepted (no-auth)");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Request a tunnel to `domain:port`
    ///
    /// Sends a CONNECT request with domain-name addressing and validates the
    /// reply. A proxy-side refusal ([`SocksError::ConnectFailed`]) leaves the
    /// session in `Greeted`; protocol or transport failures move it to
    /// `Failed`. On success the session is `Connected`, or `Secured` if a TLS
    /// upgrade was requested.
    pub async fn connect_to(&mut self, domain: &str, port: u16) -> Result<(), SocksError> {
        self.expect_state(SessionState::Greeted, "connect_to")?;
        if domain.len() > MAX_DOMAIN_LEN {
            return Err(SocksError::DomainTooLong(domain.len()));
        }

        let stream = self.transport_mut("connect_to")?;
        match exchange_connect(stream, domain, port).await {
            Ok(()) => {}
            Err(e @ SocksError::ConnectFailed(_)) => {
                // The proxy is still usable; the refusal concerns this target only
                return Err(e);
            }
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        }

        self.state = SessionState::Connected;
        info!(target.host = %domain, target.port = port, "SOCKS5 tunnel established");

        if let Some(upgrader) = self.tls.take() {
            let stream = match self.transport.take() {
                Some(stream) => stream,
                None => {
                    self.state = SessionState::Failed;
                    return Err(invalid_state("upgrade", SessionState::Failed));
                }
            };
            match upgrader.upgrade(stream, domain).await {
                Ok(tls_stream) => {
                    self.transport = Some(Box::new(tls_stream));
                    self.state = SessionState::Secured;
                    info!(target.host = %domain, "TLS established over tunnel");
                }
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(SocksError::Tls(e));
                }
            }
        }

        Ok(())
    }

    /// Write bytes to the tunneled session
    ///
    /// Forwards the bytes unmodified to whichever transport (plain or
    /// secured) is currently active.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), SocksError> {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Secured
        ) {
            return Err(invalid_state("write", self.state));
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).await?;
        } else if let Some(stream) = self.transport.as_mut() {
            stream.write_all(bytes).await?;
        } else {
            return Err(invalid_state("write", self.state));
        }
        Ok(())
    }

    /// Subscribe to the tunneled inbound bytes
    ///
    /// The inbound side is a multicast, lazy, non-restartable sequence: the
    /// reader pump starts with the first subscription, each subscriber
    /// observes bytes from its subscription moment onward, and transport
    /// errors or end-of-stream reach every active subscriber.
    pub fn subscribe(&mut self) -> Result<InboundSubscription, SocksError> {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Secured
        ) {
            return Err(invalid_state("subscribe", self.state));
        }

        if self.inbound.is_none() {
            let stream = match self.transport.take() {
                Some(stream) => stream,
                None => return Err(invalid_state("subscribe", self.state)),
            };
            let (read_half, write_half) = tokio::io::split(stream);
            self.writer = Some(write_half);
            self.inbound = Some(InboundHub::spawn(read_half));
        }

        // Registry exists from here on; the hub hands out the queue
        let hub = match self.inbound.as_mut() {
            Some(hub) => hub,
            None => return Err(invalid_state("subscribe", self.state)),
        };
        Ok(hub.subscribe())
    }

    /// Close the session
    ///
    /// Flushes pending writes best-effort (failures are logged, never
    /// raised), cancels the inbound subscription, releases the transports
    /// and moves to `Closed`. A second call is a no-op.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.shutdown().await {
                warn!(error = %e, "Flush on close failed");
            }
        }
        if let Some(stream) = self.transport.as_mut() {
            if let Err(e) = stream.shutdown().await {
                warn!(error = %e, "Flush on close failed");
            }
        }

        if let Some(hub) = self.inbound.take() {
            hub.shutdown();
        }
        self.writer = None;
        self.transport = None;
        self.state = SessionState::Closed;
        debug!("SOCKS5 session closed");
    }

    fn expect_state(
        &self,
        expected: SessionState,
        operation: &'static str,
    ) -> Result<(), SocksError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(invalid_state(operation, self.state))
        }
    }

    fn transport_mut(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut Box<dyn TunnelStream>, SocksError> {
        let state = self.state;
        self.transport
            .as_mut()
            .ok_or_else(|| invalid_state(operation, state))
    }
}

fn invalid_state(operation: &'static str, state: SessionState) -> SocksError {
    SocksError::InvalidState {
        operation,
        state: state.name(),
    }
}

/// Greeting exchange: offer no-auth, require the proxy to pick it
async fn exchange_greeting(
    stream: &mut Box<dyn TunnelStream>,
) -> Result<(), SocksError> {
    stream
        .write_all(&[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE])
        .await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;

    if reply[0] != SOCKS5_VERSION {
        return Err(SocksError::ProtocolVersionMismatch(reply[0]));
    }
    if reply[1] != SOCKS5_AUTH_METHOD_NONE {
        return Err(SocksError::AuthNegotiationFailed(reply[1]));
    }
    Ok(())
}

/// CONNECT exchange with domain-name addressing
///
/// The reply is read as a complete frame: a fixed header, then the bind
/// address sized by its type. Validation order is length, version, reply
/// code.
async fn exchange_connect(
    stream: &mut Box<dyn TunnelStream>,
    domain: &str,
    port: u16,
) -> Result<(), SocksError> {
    let domain_bytes = domain.as_bytes();
    let mut request = Vec::with_capacity(7 + domain_bytes.len());
    request.extend_from_slice(&[
        SOCKS5_VERSION,
        SOCKS5_CMD_TCP_CONNECT,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_DOMAIN,
        domain_bytes.len() as u8,
    ]);
    request.extend_from_slice(domain_bytes);
    request.extend_from_slice(&port.to_be_bytes());

    stream.write_all(&request).await?;

    // VER | REP: enough to decide success or failure
    let mut head = [0u8; 2];
    read_reply(stream, &mut head, "reply header").await?;

    if head[0] != SOCKS5_VERSION {
        return Err(SocksError::ProtocolVersionMismatch(head[0]));
    }
    if head[1] != SOCKS5_REPLY_SUCCEEDED {
        return Err(SocksError::ConnectFailed(ReplyCode::from(head[1])));
    }

    // RSV | ATYP, then the bind address and port
    let mut meta = [0u8; 2];
    read_reply(stream, &mut meta, "reply address type").await?;

    let addr_len = match meta[1] {
        SOCKS5_ADDR_TYPE_IPV4 => 4,
        SOCKS5_ADDR_TYPE_IPV6 => 16,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len = [0u8; 1];
            read_reply(stream, &mut len, "reply domain length").await?;
            len[0] as usize
        }
        other => {
            return Err(SocksError::InvalidResponse(format!(
                "unknown bind address type 0x{:02x}",
                other
            )));
        }
    };

    let mut bind = vec![0u8; addr_len + 2];
    read_reply(stream, &mut bind, "reply bind address").await?;

    Ok(())
}

/// Read an exact reply fragment, mapping truncation to `InvalidResponse`
async fn read_reply(
    stream: &mut Box<dyn TunnelStream>,
    buf: &mut [u8],
    what: &str,
) -> Result<(), SocksError> {
    stream.read_exact(buf).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SocksError::InvalidResponse(format!("truncated {}", what))
        } else {
            SocksError::Transport(e)
        }
    })?;
    Ok(())
}
