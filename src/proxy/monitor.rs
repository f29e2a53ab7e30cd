//! Polling change monitor
//!
//! The monitor repeatedly queries a [`SnapshotProvider`], resolves each
//! snapshot, and fires a callback when the resolved endpoint actually
//! changes. Polls are strictly serialized: one resolve is outstanding at a
//! time, and a tick that overruns the interval defers the next one instead
//! of running concurrently.

use super::provider::SnapshotProvider;
use super::resolver::resolve;
use super::Endpoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Observable monitor state
///
/// The monitor owns its state exclusively; [`ProxyMonitor::state`] hands out
/// copies, never references.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    /// The endpoint resolved by the most recent change
    pub cached_endpoint: Option<Endpoint>,
    /// When the cached endpoint last changed
    pub last_update_time: Option<SystemTime>,
    /// Number of completed polls since start
    pub poll_count: u64,
    /// Whether the monitor is currently running
    pub running: bool,
}

struct MonitorControl {
    shutdown: broadcast::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polling proxy-change monitor
pub struct ProxyMonitor<P: SnapshotProvider> {
    provider: Arc<P>,
    poll_interval: Duration,
    state: Arc<Mutex<MonitorState>>,
    running: Arc<AtomicBool>,
    control: Mutex<Option<MonitorControl>>,
}

impl<P: SnapshotProvider + 'static> ProxyMonitor<P> {
    /// Create a monitor polling `provider` at [`DEFAULT_POLL_INTERVAL`]
    pub fn new(provider: P) -> Self {
        Self::with_interval(provider, DEFAULT_POLL_INTERVAL)
    }

    /// Create a monitor with a custom poll interval
    pub fn with_interval(provider: P, poll_interval: Duration) -> Self {
        ProxyMonitor {
            provider: Arc::new(provider),
            poll_interval,
            state: Arc::new(Mutex::new(MonitorState::default())),
            running: Arc::new(AtomicBool::new(false)),
            control: Mutex::new(None),
        }
    }

    /// Start polling
    ///
    /// Performs one immediate poll, then keeps polling at the configured
    /// interval until [`ProxyMonitor::stop`]. The callback fires exactly once
    /// per detected change, after the cached state has been updated. Calling
    /// `start` while already running is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, on_change: F)
    where
        F: Fn(Option<Endpoint>) + Send + Sync + 'static,
    {
        let mut control = self.control.lock().unwrap();
        if control.is_some() {
            warn!("Proxy monitor already running, ignoring start");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            *state = MonitorState {
                running: true,
                ..MonitorState::default()
            };
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(poll_interval);
            // An overrunning poll defers the next tick rather than bunching
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = poll_interval.as_secs_f64(), "Proxy monitor started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Proxy monitor shutting down");
                        break;
                    }
                    _ = ticks.tick() => {
                        poll_once(provider.as_ref(), &state, &running, &on_change).await;
                    }
                }
            }
        });

        *control = Some(MonitorControl {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Stop polling
    ///
    /// Cancels all future ticks immediately and clears the cached state. A
    /// poll already in flight is allowed to finish, but its result is
    /// discarded. Calling `stop` while stopped is a no-op.
    pub fn stop(&self) {
        let mut control = self.control.lock().unwrap();
        let Some(ctl) = control.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        let _ = ctl.shutdown.send(true);

        let mut state = self.state.lock().unwrap();
        *state = MonitorState::default();
        info!("Proxy monitor stopped");
    }

    /// Copy of the current monitor state
    pub fn state(&self) -> MonitorState {
        self.state.lock().unwrap().clone()
    }

    /// Whether the monitor is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<P: SnapshotProvider> Drop for ProxyMonitor<P> {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            if let Some(ctl) = control.take() {
                self.running.store(false, Ordering::SeqCst);
                let _ = ctl.shutdown.send(true);
                // Nothing can observe the poll task once the monitor is gone
                ctl.task.abort();
            }
        }
    }
}

/// Run a single poll: query, resolve, compare, notify
async fn poll_once<P, F>(
    provider: &P,
    state: &Mutex<MonitorState>,
    running: &AtomicBool,
    on_change: &F,
) where
    P: SnapshotProvider,
    F: Fn(Option<Endpoint>) + Send + Sync,
{
    let snapshot = match provider.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // A failed query skips the tick; the cached endpoint stays as-is
            // and polling continues.
            warn!(error = %e, "Proxy snapshot query failed, keeping cached endpoint");
            return;
        }
    };

    // The monitor may have been stopped while the query was in flight
    if !running.load(Ordering::SeqCst) {
        debug!("Discarding poll result that completed after stop");
        return;
    }

    let resolved = resolve(&snapshot);

    let changed = {
        let mut state = state.lock().unwrap();
        state.poll_count += 1;
        let changed = !same_route(&state.cached_endpoint, &resolved);
        if changed {
            state.cached_endpoint = resolved.clone();
            state.last_update_time = Some(SystemTime::now());
        }
        changed
    };

    if changed {
        match &resolved {
            Some(endpoint) => info!(proxy = %endpoint, "Proxy change detected"),
            None => info!("Proxy removed"),
        }
        on_change(resolved);
    }
}

/// Structural equality on (host, port, kind); credentials are excluded
fn same_route(a: &Option<Endpoint>, b: &Option<Endpoint>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_route(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotError;
    use crate::proxy::{ProxyKind, ProxySetting, ProxySnapshot};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Provider that replays a scripted sequence of query results, then
    /// repeats the last one forever.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProxySnapshot, String>>>,
        last: Mutex<Result<ProxySnapshot, String>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProxySnapshot, String>>) -> Self {
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

    #[async_trait]
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

    fn socks_snapshot(host: &str, port: u16) -> ProxySnapshot {
        ProxySnapshot {
            socks5: ProxySetting::new(host, port),
            ..ProxySnapshot::empty()
        }
    }

    fn collecting_callback() -> (
        Arc<Mutex<Vec<Option<Endpoint>>>>,
        impl Fn(Option<Endpoint>) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |endpoint| sink.lock().unwrap().push(endpoint))
    }

    async fn drive_polls<P: SnapshotProvider>(
        provider: &P,
        state: &Mutex<MonitorState>,
        running: &AtomicBool,
        on_change: &(impl Fn(Option<Endpoint>) + Send + Sync),
        polls: usize,
    ) {
        for _ in 0..polls {
            poll_once(provider, state, running, on_change).await;
        }
    }

    #[tokio::test]
    async fn test_identical_snapshots_fire_callback_once() {
        let provider = ScriptedProvider::new(vec![Ok(socks_snapshot("proxy", 1080))]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 5).await;

        // First poll transitions unconfigured -> configured, the other four
        // observe no change.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap().host, "proxy");
        assert_eq!(state.lock().unwrap().poll_count, 5);
    }

    #[tokio::test]
    async fn test_two_transitions_fire_twice() {
        let provider = ScriptedProvider::new(vec![
            Ok(ProxySnapshot::empty()),
            Ok(socks_snapshot("h1", 1001)),
            Ok(socks_snapshot("h2", 1002)),
        ]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 3).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_ref().unwrap().host, "h1");
        assert_eq!(seen[0].as_ref().unwrap().port, 1001);
        assert_eq!(seen[1].as_ref().unwrap().host, "h2");
        assert_eq!(seen[1].as_ref().unwrap().port, 1002);
    }

    #[tokio::test]
    async fn test_removal_fires_with_none() {
        let provider = ScriptedProvider::new(vec![
            Ok(socks_snapshot("h1", 1001)),
            Ok(ProxySnapshot::empty()),
        ]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 2).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_some());
        assert!(seen[1].is_none());
        assert!(state.lock().unwrap().cached_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_query_failure_skips_tick_and_keeps_cache() {
        let provider = ScriptedProvider::new(vec![
            Ok(socks_snapshot("h1", 1001)),
            Err("registry offline".to_string()),
            Ok(socks_snapshot("h1", 1001)),
        ]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 3).await;

        // The failed tick neither fires the callback nor counts as a poll
        assert_eq!(seen.lock().unwrap().len(), 1);
        let state = state.lock().unwrap();
        assert_eq!(state.poll_count, 2);
        assert_eq!(state.cached_endpoint.as_ref().unwrap().host, "h1");
    }

    #[tokio::test]
    async fn test_credential_only_change_not_reported() {
        let with_auth = ProxySnapshot {
            socks5: ProxySetting::new("proxy", 1080).with_auth(crate::proxy::ProxyAuth {
                username: "new-user".to_string(),
                password: "new-pass".to_string(),
            }),
            ..ProxySnapshot::empty()
        };
        let provider = ScriptedProvider::new(vec![
            Ok(socks_snapshot("proxy", 1080)),
            Ok(with_auth),
        ]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 2).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_result_discarded_after_stop() {
        let provider = ScriptedProvider::new(vec![Ok(socks_snapshot("late", 1080))]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(false);
        let (seen, callback) = collecting_callback();

        poll_once(&provider, &state, &running, &callback).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(state.lock().unwrap().poll_count, 0);
    }

    #[tokio::test]
    async fn test_kind_change_is_reported() {
        let https_only = ProxySnapshot {
            https: ProxySetting::new("proxy", 1080),
            ..ProxySnapshot::empty()
        };
        let provider = ScriptedProvider::new(vec![
            Ok(socks_snapshot("proxy", 1080)),
            Ok(https_only),
        ]);
        let state = Mutex::new(MonitorState::default());
        let running = AtomicBool::new(true);
        let (seen, callback) = collecting_callback();

        drive_polls(&provider, &state, &running, &callback, 2).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].as_ref().unwrap().kind, ProxyKind::HttpConnect);
    }

    #[tokio::test]
    async fn test_start_and_stop_lifecycle() {
        let provider = StaticProviderAdapter(socks_snapshot("proxy", 1080));
        let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(!monitor.is_running());

        let counter = Arc::clone(&fired);
        monitor.start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(monitor.is_running());

        // Wait for the immediate poll plus a few ticks
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let state = monitor.state();
        assert!(state.running);
        assert!(state.poll_count >= 1);
        assert!(state.last_update_time.is_some());
        assert_eq!(state.cached_endpoint.unwrap().host, "proxy");

        monitor.stop();
        assert!(!monitor.is_running());

        // State is cleared on stop
        let state = monitor.state();
        assert!(!state.running);
        assert_eq!(state.poll_count, 0);
        assert!(state.cached_endpoint.is_none());

        // Second stop is a no-op
        monitor.stop();
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let provider = StaticProviderAdapter(ProxySnapshot::empty());
        let monitor = ProxyMonitor::with_interval(provider, Duration::from_millis(20));

        monitor.start(|_| {});
        monitor.start(|_| {});

        monitor.stop();
    }

    /// Minimal always-Ok provider for lifecycle tests
    struct StaticProviderAdapter(ProxySnapshot);

    #[async_trait]
    impl SnapshotProvider for StaticProviderAdapter {
        async fn snapshot(&self) -> Result<ProxySnapshot, SnapshotError> {
            Ok(self.0.clone())
        }
    }
}
