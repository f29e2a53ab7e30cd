//! Multicast inbound byte channel
//!
//! Bytes arriving on the tunneled session are fanned out to every active
//! subscriber through an explicit registry of per-subscriber queues. The
//! reader pump starts with the first subscription and never restarts: after
//! the transport ends (EOF or error) late subscribers observe an immediately
//! completed stream.
//!
//! Backpressure is explicit: each subscriber has a bounded queue, and a full
//! queue makes the pump wait before reading more from the transport.

use super::{TunnelStream, DEFAULT_BUFFER_SIZE};
use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::{debug, trace};

/// Queue depth per subscriber
const SUBSCRIBER_QUEUE_DEPTH: usize = 32;

/// Event delivered to subscribers
#[derive(Debug, Clone)]
enum InboundEvent {
    /// A chunk of tunneled bytes
    Data(Bytes),
    /// The transport failed; the kind and message reconstruct an
    /// [`io::Error`] per subscriber
    Error(io::ErrorKind, String),
}

type SubscriberMap = Arc<Mutex<HashMap<u64, mpsc::Sender<InboundEvent>>>>;

/// Registry of subscriber queues plus the reader pump feeding them
pub(crate) struct InboundHub {
    subscribers: SubscriberMap,
    next_id: u64,
    pump: JoinHandle<()>,
}

impl InboundHub {
    /// Start the reader pump over the read half of a tunnel
    pub(crate) fn spawn(read: ReadHalf<Box<dyn TunnelStream>>) -> Self {
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let pump = tokio::spawn(pump_loop(read, Arc::clone(&subscribers)));
        InboundHub {
            subscribers,
            next_id: 0,
            pump,
        }
    }

    /// Register a new subscriber
    ///
    /// The subscription observes bytes arriving from this moment onward. If
    /// the pump has already finished, the subscription completes immediately.
    pub(crate) fn subscribe(&mut self) -> InboundSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        if !self.pump.is_finished() {
            let id = self.next_id;
            self.next_id += 1;
            self.subscribers.lock().unwrap().insert(id, tx);
            trace!(subscriber = id, "Inbound subscriber registered");
        }
        InboundSubscription { rx }
    }

    /// Cancel the pump and complete all subscriptions
    pub(crate) fn shutdown(&self) {
        self.pump.abort();
        self.subscribers.lock().unwrap().clear();
    }
}

impl Drop for InboundHub {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Read from the tunnel and fan chunks out to every subscriber
async fn pump_loop(mut read: ReadHalf<Box<dyn TunnelStream>>, subscribers: SubscriberMap) {
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];

    loop {
        match read.read(&mut buf).await {
            Ok(0) => {
                debug!("Tunnel reached end of stream");
                break;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                fan_out(&subscribers, InboundEvent::Data(chunk)).await;
            }
            Err(e) => {
                debug!(error = %e, "Tunnel read failed, notifying subscribers");
                fan_out(&subscribers, InboundEvent::Error(e.kind(), e.to_string())).await;
                break;
            }
        }
    }

    // Dropping the senders completes every remaining subscription
    subscribers.lock().unwrap().clear();
}

/// Deliver one event to every subscriber, pruning the ones that went away
async fn fan_out(subscribers: &SubscriberMap, event: InboundEvent) {
    let targets: Vec<(u64, mpsc::Sender<InboundEvent>)> = subscribers
        .lock()
        .unwrap()
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut dropped = Vec::new();
    for (id, tx) in targets {
        // A full queue blocks here until the subscriber drains it
        if tx.send(event.clone()).await.is_err() {
            dropped.push(id);
        }
    }

    if !dropped.is_empty() {
        let mut subscribers = subscribers.lock().unwrap();
        for id in dropped {
            subscribers.remove(&id);
            trace!(subscriber = id, "Inbound subscriber dropped");
        }
    }
}

/// One subscriber's view of the tunneled inbound bytes
///
/// A `Stream` of byte chunks; a transport error is yielded once as an `Err`
/// item, and end-of-transport (or [`Socks5Tunnel::close`]) completes the
/// stream.
///
/// [`Socks5Tunnel::close`]: super::Socks5Tunnel::close
#[derive(Debug)]
pub struct InboundSubscription {
    rx: mpsc::Receiver<InboundEvent>,
}

impl InboundSubscription {
    /// Receive the next chunk, or `None` once the stream completed
    pub async fn recv(&mut self) -> Option<io::Result<Bytes>> {
        self.rx.recv().await.map(InboundEvent::into_result)
    }
}

impl InboundEvent {
    fn into_result(self) -> io::Result<Bytes> {
        match self {
            InboundEvent::Data(chunk) => Ok(chunk),
            InboundEvent::Error(kind, message) => Err(io::Error::new(kind, message)),
        }
    }
}

impl Stream for InboundSubscription {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|event| event.map(InboundEvent::into_result))
    }
}
