//! # Sockswatch - System Proxy Detection and SOCKS5 Tunneling
//!
//! Sockswatch routes outbound connections of an anonymity-network runtime
//! through a proxy that is auto-detected from the operating environment,
//! continuously re-detected as the environment changes, and used to tunnel
//! traffic via a SOCKS5 handshake.
//!
//! ## Features
//!
//! - **Snapshot Resolution**: one pure priority rule (SOCKS5, then HTTPS,
//!   then HTTP) turns a three-way proxy snapshot into at most one endpoint
//! - **Change Monitoring**: a polling monitor detects proxy transitions and
//!   notifies exactly once per change
//! - **SOCKS5 Client**: greeting and CONNECT state machine with domain-name
//!   addressing, optional TLS upgrade over the established tunnel, and a
//!   multicast inbound byte channel
//! - **HTTP CONNECT Client**: tunnels through HTTP proxies with optional
//!   Basic authorization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockswatch::proxy::{EnvSnapshotProvider, ProxyMonitor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = ProxyMonitor::new(EnvSnapshotProvider::new());
//!     monitor.start(|endpoint| match endpoint {
//!         Some(endpoint) => println!("proxy is now {}", endpoint),
//!         None => println!("no proxy configured"),
//!     });
//! }
//! ```
//!
//! ## Architecture
//!
//! Detection flows one way, the tunnel runs independently:
//!
//! ```text
//! Snapshot Provider -> Resolver -> Change Monitor -> Runtime (set_proxy)
//! Consumer -> Socks5Tunnel -> Proxy -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod runtime;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{HttpProxyError, ParseError, ReplyCode, SnapshotError, SocksError};
pub use proxy::{
    parse_proxy_url, resolve, Endpoint, EnvSnapshotProvider, MonitorState, ProxyAuth,
    ProxyConfig, ProxyKind, ProxyMonitor, ProxySnapshot, SnapshotProvider,
};
pub use runtime::{NetworkRuntime, RuntimeBridge};
pub use tunnel::{HttpConnectTunnel, InboundSubscription, SessionState, Socks5Tunnel, TlsUpgrader};

/// Version of the Sockswatch library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
