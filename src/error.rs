//! Error types for Sockswatch
//!
//! This module defines all custom error types used throughout the library.

use std::io;
use thiserror::Error;

/// Errors produced while parsing a proxy URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The URL has no host component
    #[error("Proxy URL has no host")]
    MissingHost,

    /// The URL scheme is not one of http, https, socks5, socks
    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    /// The text is not a well-formed URL
    #[error("Invalid proxy URL: {0}")]
    Invalid(String),
}

/// Errors produced while querying the snapshot provider
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The provider query itself failed
    #[error("Proxy snapshot query failed: {0}")]
    QueryFailed(String),
}

impl SnapshotError {
    /// Create a query failure from any displayable cause
    pub fn query(msg: impl Into<String>) -> Self {
        SnapshotError::QueryFailed(msg.into())
    }
}

/// Errors produced by the SOCKS5 tunnel client
#[derive(Error, Debug)]
pub enum SocksError {
    /// The proxy selected an authentication method other than no-auth
    #[error("Authentication negotiation failed: proxy selected method 0x{0:02x}")]
    AuthNegotiationFailed(u8),

    /// A reply carried a SOCKS version other than 5
    #[error("Protocol version mismatch: expected 0x05, got 0x{0:02x}")]
    ProtocolVersionMismatch(u8),

    /// A reply was truncated or structurally invalid
    #[error("Invalid proxy response: {0}")]
    InvalidResponse(String),

    /// The proxy refused the CONNECT request
    #[error("Connect failed: {0}")]
    ConnectFailed(ReplyCode),

    /// An operation was invoked from the wrong session state
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// The operation that was attempted
        operation: &'static str,
        /// The session state at the time of the call
        state: &'static str,
    },

    /// The target domain does not fit the one-byte length field
    #[error("Target domain too long: {0} bytes (max 255)")]
    DomainTooLong(usize),

    /// The underlying connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// The secure-channel handshake over the tunnel failed
    #[error("TLS upgrade failed: {0}")]
    Tls(#[source] io::Error),
}

impl SocksError {
    /// Short category tag for structured log fields
    pub fn category(&self) -> &'static str {
        match self {
            SocksError::AuthNegotiationFailed(_) => "auth",
            SocksError::ProtocolVersionMismatch(_) => "protocol",
            SocksError::InvalidResponse(_) => "protocol",
            SocksError::ConnectFailed(_) => "connect",
            SocksError::InvalidState { .. } => "state",
            SocksError::DomainTooLong(_) => "request",
            SocksError::Transport(_) => "transport",
            SocksError::Tls(_) => "tls",
        }
    }
}

/// Errors produced by the HTTP CONNECT tunnel client
#[derive(Error, Debug)]
pub enum HttpProxyError {
    /// The proxy answered with a non-2xx status line
    #[error("HTTP CONNECT refused: {0}")]
    Status(String),

    /// The proxy response header block exceeded the size cap
    #[error("HTTP CONNECT response too large: {0} bytes")]
    ResponseTooLarge(usize),

    /// The underlying connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),
}

/// SOCKS5 CONNECT reply codes (RFC 1928 section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    /// General SOCKS server failure
    GeneralFailure,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed,
    /// Network unreachable
    NetworkUnreachable,
    /// Host unreachable
    HostUnreachable,
    /// Connection refused
    ConnectionRefused,
    /// TTL expired
    TtlExpired,
    /// Command not supported
    CommandNotSupported,
    /// Address type not supported
    AddressTypeNotSupported,
    /// A code outside the RFC 1928 table
    Unknown(u8),
}

impl From<u8> for ReplyCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ReplyCode::GeneralFailure,
            0x02 => ReplyCode::ConnectionNotAllowed,
            0x03 => ReplyCode::NetworkUnreachable,
            0x04 => ReplyCode::HostUnreachable,
            0x05 => ReplyCode::ConnectionRefused,
            0x06 => ReplyCode::TtlExpired,
            0x07 => ReplyCode::CommandNotSupported,
            0x08 => ReplyCode::AddressTypeNotSupported,
            other => ReplyCode::Unknown(other),
        }
    }
}

impl ReplyCode {
    /// The wire value of this reply code
    pub fn as_u8(&self) -> u8 {
        match self {
            ReplyCode::GeneralFailure => 0x01,
            ReplyCode::ConnectionNotAllowed => 0x02,
            ReplyCode::NetworkUnreachable => 0x03,
            ReplyCode::HostUnreachable => 0x04,
            ReplyCode::ConnectionRefused => 0x05,
            ReplyCode::TtlExpired => 0x06,
            ReplyCode::CommandNotSupported => 0x07,
            ReplyCode::AddressTypeNotSupported => 0x08,
            ReplyCode::Unknown(code) => *code,
        }
    }

    /// Human-readable description from the RFC 1928 table
    pub fn message(&self) -> &'static str {
        match self {
            ReplyCode::GeneralFailure => "General SOCKS server failure",
            ReplyCode::ConnectionNotAllowed => "Connection not allowed by ruleset",
            ReplyCode::NetworkUnreachable => "Network unreachable",
            ReplyCode::HostUnreachable => "Host unreachable",
            ReplyCode::ConnectionRefused => "Connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "Command not supported",
            ReplyCode::AddressTypeNotSupported => "Address type not supported",
            ReplyCode::Unknown(_) => "Unknown SOCKS error",
        }
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code 0x{:02x})", self.message(), self.as_u8())
    }
}
