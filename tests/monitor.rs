//! Integration tests for the change monitor driving a runtime stub

mod common;

use common::{socks_snapshot, ScriptedProvider};
use sockswatch::proxy::{Endpoint, ProxyMonitor, ProxySnapshot};
use sockswatch::runtime::{NetworkRuntime, RuntimeBridge};
use sockswatch::config::RuntimeConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Runtime stub recording every proxy update
#[derive(Default)]
struct RecordingRuntime {
    proxies: Mutex<Vec<Option<Endpoint>>>,
}

#[async_trait::async_trait]
impl NetworkRuntime for RecordingRuntime {
    async fn start(&self, settings: &RuntimeConfig) -> anyhow::Result<u16> {
        Ok(settings.socks_port)
    }

    fn set_proxy(&self, proxy: Option<Endpoint>) {
        self.proxies.lock().unwrap().push(proxy);
    }

    fn stop(&self) {}

    fn set_dormant(&self, _soft_mode: bool) {}
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn monitor_reports_transitions_to_runtime() {
    let provider = ScriptedProvider::new(vec![
        Ok(ProxySnapshot::empty()),
        Ok(socks_snapshot("h1", 1001)),
        Ok(socks_snapshot("h1", 1001)),
        Ok(socks_snapshot("h2", 1002)),
        Ok(socks_snapshot("h2", 1002)),
    ]);
    let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));
    let runtime = Arc::new(RecordingRuntime::default());

    RuntimeBridge::new(Arc::clone(&runtime)).attach(&monitor);
    settle().await;
    monitor.stop();

    let proxies = runtime.proxies.lock().unwrap();
    assert_eq!(proxies.len(), 2, "one callback per transition, none for repeats");
    let first = proxies[0].as_ref().unwrap();
    assert_eq!((first.host.as_str(), first.port), ("h1", 1001));
    let second = proxies[1].as_ref().unwrap();
    assert_eq!((second.host.as_str(), second.port), ("h2", 1002));
}

#[tokio::test]
async fn monitor_reports_proxy_removal_as_none() {
    let provider = ScriptedProvider::new(vec![
        Ok(socks_snapshot("h1", 1001)),
        Ok(ProxySnapshot::empty()),
    ]);
    let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));
    let runtime = Arc::new(RecordingRuntime::default());

    RuntimeBridge::new(Arc::clone(&runtime)).attach(&monitor);
    settle().await;
    monitor.stop();

    let proxies = runtime.proxies.lock().unwrap();
    assert_eq!(proxies.len(), 2);
    assert!(proxies[0].is_some());
    assert!(proxies[1].is_none());
}

#[tokio::test]
async fn monitor_survives_provider_failures() {
    let provider = ScriptedProvider::new(vec![
        Err("registry offline".to_string()),
        Err("registry offline".to_string()),
        Ok(socks_snapshot("late", 1080)),
    ]);
    let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));
    let runtime = Arc::new(RecordingRuntime::default());

    RuntimeBridge::new(Arc::clone(&runtime)).attach(&monitor);
    settle().await;

    // The failures were swallowed; polling carried on and found the proxy
    let state = monitor.state();
    assert!(state.running);
    assert_eq!(state.cached_endpoint.as_ref().unwrap().host, "late");

    monitor.stop();
    assert_eq!(runtime.proxies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn stop_clears_state_and_silences_callbacks() {
    let provider = ScriptedProvider::new(vec![Ok(socks_snapshot("h1", 1001))]);
    let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));
    let runtime = Arc::new(RecordingRuntime::default());

    RuntimeBridge::new(Arc::clone(&runtime)).attach(&monitor);
    settle().await;
    monitor.stop();

    let calls_at_stop = runtime.proxies.lock().unwrap().len();
    let state = monitor.state();
    assert!(!state.running);
    assert!(state.cached_endpoint.is_none());
    assert_eq!(state.poll_count, 0);

    // No further callbacks after stop
    settle().await;
    assert_eq!(runtime.proxies.lock().unwrap().len(), calls_at_stop);
}
