//! Test utilities and mocks for Sockswatch
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use sockswatch::error::SnapshotError;
use sockswatch::proxy::{ProxySetting, ProxySnapshot, SnapshotProvider};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Behavior of the mock proxy once the CONNECT request arrives
#[derive(Debug, Clone, Copy)]
pub enum MockProxyMode {
    /// Accept the tunnel and echo all tunneled bytes back
    AcceptAndEcho,
    /// Refuse the CONNECT with the given reply code
    Refuse(u8),
    /// Answer the greeting with the given method byte and stop
    RejectAuth(u8),
}

/// Spawn a single-connection mock SOCKS5 proxy
///
/// Speaks the no-auth greeting and the CONNECT exchange, then acts according
/// to `mode`. Returns the address to connect to.
pub async fn spawn_mock_socks5(mode: MockProxyMode) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        handle_socks5(&mut stream, mode).await;
    });

    addr
}

async fn handle_socks5(stream: &mut TcpStream, mode: MockProxyMode) {
    // Greeting: VER | NMETHODS | METHODS
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await.unwrap();
    assert_eq!(greeting[0], 0x05);
    let mut methods = vec![0u8; greeting[1] as usize];
    stream.read_exact(&mut methods).await.unwrap();

    if let MockProxyMode::RejectAuth(method) = mode {
        stream.write_all(&[0x05, method]).await.unwrap();
        return;
    }
    stream.write_all(&[0x05, 0x00]).await.unwrap();

    // CONNECT: VER | CMD | RSV | ATYP | len | domain | port
    let mut head = [0u8; 5];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(head[0], 0x05);
    assert_eq!(head[1], 0x01);
    assert_eq!(head[3], 0x03, "mock proxy only speaks domain addressing");
    let mut rest = vec![0u8; head[4] as usize + 2];
    stream.read_exact(&mut rest).await.unwrap();

    match mode {
        MockProxyMode::Refuse(code) => {
            stream
                .write_all(&[0x05, code, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
        }
        MockProxyMode::AcceptAndEcho => {
            stream
                .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();

            // Echo tunneled bytes until the client goes away
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        MockProxyMode::RejectAuth(_) => unreachable!(),
    }
}

/// Snapshot provider replaying a scripted sequence, repeating the last entry
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProxySnapshot, String>>>,
    last: Mutex<Result<ProxySnapshot, String>>,
}

impl ScriptedProvider {
    /// Create a provider from a script of query results
    pub fn new(script: Vec<Result<ProxySnapshot, String>>) -> Self {
        let script: VecDeque<_> = script.into();
        let last = script
            .back()
            .cloned()
            .unwrap_or_else(|| Ok(ProxySnapshot::empty()));
        ScriptedProvider {
            script: Mutex::new(script),
            last: Mutex::new(last),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for ScriptedProvider {
    async fn snapshot(&self) -> Result<ProxySnapshot, SnapshotError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(entry) => {
                    *self.last.lock().unwrap() = entry.clone();
                    entry
                }
                None => self.last.lock().unwrap().clone(),
            }
        };
        next.map_err(SnapshotError::QueryFailed)
    }
}

/// Snapshot with only the SOCKS5 slot configured
pub fn socks_snapshot(host: &str, port: u16) -> ProxySnapshot {
    ProxySnapshot {
        socks5: ProxySetting::new(host, port),
        ..ProxySnapshot::empty()
    }
}
