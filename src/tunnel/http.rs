//! HTTP CONNECT tunnel client
//!
//! Establishes a TCP tunnel through an HTTP proxy using the CONNECT method,
//! with optional Basic proxy authorization. After a successful exchange the
//! stream carries the tunneled session directly.

use super::{SocketOpts, TunnelStream};
use crate::error::HttpProxyError;
use crate::proxy::{Endpoint, ProxyAuth};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Cap on the proxy response header block
const MAX_RESPONSE_LEN: usize = 8192;

/// HTTP CONNECT tunnel
///
/// Thin wrapper owning the stream once the CONNECT exchange succeeded.
pub struct HttpConnectTunnel {
    stream: Box<dyn TunnelStream>,
}

impl HttpConnectTunnel {
    /// Open a TCP connection to an HTTP proxy and tunnel to `host:port`
    pub async fn open(
        proxy: &Endpoint,
        host: &str,
        port: u16,
        opts: &SocketOpts,
        connect_timeout: Duration,
    ) -> Result<Self, HttpProxyError> {
        let addr = (proxy.host.as_str(), proxy.port);
        let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                HttpProxyError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Connection to proxy {} timed out", proxy),
                ))
            })??;

        opts.apply(&stream)?;
        debug!(proxy = %proxy, "Connected to HTTP proxy");

        establish(&mut stream, host, port, proxy.auth.as_ref()).await?;
        info!(target.host = %host, target.port = port, "HTTP CONNECT tunnel established");

        Ok(HttpConnectTunnel {
            stream: Box::new(stream),
        })
    }

    /// Take ownership of the tunneled stream
    pub fn into_stream(self) -> Box<dyn TunnelStream> {
        self.stream
    }
}

/// Perform the CONNECT exchange on an existing stream
///
/// Sends the CONNECT request (with `Proxy-Authorization: Basic` when
/// credentials are present), reads the response headers up to the blank
/// line, and requires an `HTTP/1.x 200` status.
pub async fn establish<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    auth: Option<&ProxyAuth>,
) -> Result<(), HttpProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!(
        "CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n",
        host, port, host, port
    );

    if let Some(auth) = auth {
        let credentials = format!("{}:{}", auth.username, auth.password);
        let encoded = STANDARD.encode(credentials.as_bytes());
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", encoded));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;

    // Read until the end of the header block
    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        response.push(byte[0]);

        if response.ends_with(b"\r\n\r\n") {
            break;
        }
        if response.len() > MAX_RESPONSE_LEN {
            return Err(HttpProxyError::ResponseTooLarge(response.len()));
        }
    }

    let response = String::from_utf8_lossy(&response);
    if !response.starts_with("HTTP/1.1 200") && !response.starts_with("HTTP/1.0 200") {
        let status_line = response.lines().next().unwrap_or("").to_string();
        return Err(HttpProxyError::Status(status_line));
    }

    Ok(())
}
