//! Self-healing WebSocket channel to the projection endpoint.
//!
//! One background task owns the socket. It connects, pumps outgoing text
//! frames until the connection drops, waits the reconnect delay and tries
//! again, forever. Senders never block: a frame is queued when the channel
//! is open and its bounded queue has room, and dropped otherwise.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::config::BridgeConfig;
use crate::protocol::BroadcastPayload;

/// Frames buffered for the writer before new ones are dropped.
pub const OUTGOING_CAPACITY: usize = 256;

/// Connection lifecycle. A fresh channel is `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Transport errors. Never surfaced to senders; the run loop logs them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("socket error: {0}")]
    Socket(#[from] tungstenite::Error),
}

/// Counters for monitoring the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub connect_attempts: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

struct AtomicTransportStats {
    connect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

impl AtomicTransportStats {
    fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// The WebSocket channel.
///
/// Share it behind an `Arc`; one instance holds at most one connection.
pub struct TransportChannel {
    url: String,
    reconnect_delay: Duration,
    started: AtomicBool,
    stopped: AtomicBool,
    state: watch::Sender<ConnectionState>,
    outgoing: Mutex<Option<mpsc::Sender<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: AtomicTransportStats,
}

impl TransportChannel {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            url: url.into(),
            reconnect_delay,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            state,
            outgoing: Mutex::new(None),
            task: Mutex::new(None),
            stats: AtomicTransportStats::new(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.endpoint_url.clone(), config.reconnect_delay())
    }

    /// Start the connect loop on the current runtime.
    ///
    /// Returns false if the channel was already started.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        self.start_on(&Handle::current())
    }

    /// Start the connect loop on `runtime`. Returns false if already started.
    pub fn start_on(self: &Arc<Self>, runtime: &Handle) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let channel = self.clone();
        *self.task.lock() = Some(runtime.spawn(channel.run()));
        true
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("connecting to {} (attempt {})", self.url, attempt);

            match self.connect_once().await {
                Ok(()) => log::info!("connection to {} closed", self.url),
                Err(e) => log::warn!("{}: {}", self.url, e),
            }
            self.set_state(ConnectionState::Closed);

            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn connect_once(&self) -> Result<(), TransportError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(TransportError::Connect)?;
        let (mut writer, mut reader) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);
        *self.outgoing.lock() = Some(out_tx);
        self.set_state(ConnectionState::Open);
        log::info!("connected to {}", self.url);

        let result = loop {
            tokio::select! {
                frame = out_rx.recv() => match frame {
                    Some(text) => {
                        if let Err(e) = writer.send(Message::Text(text.into())).await {
                            break Err(e.into());
                        }
                    }
                    // Sender taken by shutdown.
                    None => break Ok(()),
                },
                incoming = reader.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
            }
        };

        self.outgoing.lock().take();
        result
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::trace!("{}: {:?} -> {:?}", self.url, previous, next);
        }
    }

    /// Serialize and queue a payload. False if dropped.
    pub fn send(&self, payload: &BroadcastPayload) -> bool {
        match payload.to_json() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                log::warn!("dropping payload for {}: {}", payload.address, e);
                self.record_drop();
                false
            }
        }
    }

    /// Queue a raw text frame. False if the channel is not open or the
    /// outgoing queue is full.
    pub fn send_text(&self, text: String) -> bool {
        if !self.is_open() {
            self.record_drop();
            return false;
        }
        let queued = match self.outgoing.lock().as_ref() {
            // A full queue means the endpoint stalls; fresher frames follow.
            Some(tx) => tx.try_send(text).is_ok(),
            None => false,
        };
        if queued {
            self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.record_drop();
        }
        queued
    }

    /// Count a frame that was dropped before reaching the queue.
    pub(crate) fn record_drop(&self) {
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Stop the connect loop and close the socket. The channel cannot be
    /// started again afterwards.
    pub fn shutdown(&self) {
        self.started.store(true, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.outgoing.lock().take();
        self.set_state(ConnectionState::Closed);
        log::debug!("transport to {} shut down", self.url);
    }
}
