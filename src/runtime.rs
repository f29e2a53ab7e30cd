//! Anonymity-network runtime control surface
//!
//! The runtime itself (bootstrap, circuits, local SOCKS listener) lives
//! outside this crate. What is defined here is the narrow control surface it
//! must expose, and the bridge that keeps it fed with the monitor's resolved
//! endpoint: on every detected change the bridge calls
//! [`NetworkRuntime::set_proxy`] with the new endpoint, or `None` when the
//! proxy went away.

use crate::config::RuntimeConfig;
use crate::proxy::{Endpoint, ProxyMonitor, SnapshotProvider};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Control surface of the external anonymity-network runtime
#[async_trait]
pub trait NetworkRuntime: Send + Sync {
    /// Start the runtime and return the actual local SOCKS port
    async fn start(&self, settings: &RuntimeConfig) -> Result<u16>;

    /// Update the outbound proxy; `None` means direct connections
    ///
    /// May be called at any time, before or while the runtime is up; changes
    /// take effect for new connections.
    fn set_proxy(&self, proxy: Option<Endpoint>);

    /// Stop the runtime
    fn stop(&self);

    /// Put the runtime into dormant mode (`soft_mode` keeps listeners open)
    fn set_dormant(&self, soft_mode: bool);
}

/// Bridge between the change monitor and the runtime
///
/// Attaching the bridge starts the monitor with a callback that forwards
/// every detected proxy change to the runtime.
pub struct RuntimeBridge<R> {
    runtime: Arc<R>,
}

impl<R: NetworkRuntime + 'static> RuntimeBridge<R> {
    /// Create a bridge around a runtime handle
    pub fn new(runtime: Arc<R>) -> Self {
        RuntimeBridge { runtime }
    }

    /// Start `monitor` and forward its changes to the runtime
    pub fn attach<P: SnapshotProvider + 'static>(&self, monitor: &ProxyMonitor<P>) {
        let runtime = Arc::clone(&self.runtime);
        monitor.start(move |endpoint| {
            match &endpoint {
                Some(endpoint) => info!(proxy = %endpoint, "Forwarding proxy change to runtime"),
                None => info!("Proxy removed, runtime falls back to direct connections"),
            }
            runtime.set_proxy(endpoint);
        });
    }
}
