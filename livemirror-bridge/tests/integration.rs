//! End-to-end tests against a real local WebSocket endpoint.
//!
//! Each test binds an endpoint on a free port that records connections and
//! forwards every received text frame, then drives the bridge through a
//! `CollabText` buffer and a `MemoryView`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use livemirror_bridge::{
    selectors, BridgeConfig, BridgeController, ConnectionState, MemoryView, Rect,
    TransportChannel,
};
use livemirror_core::CollabText;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;

const LINE: &str =
    r#"<div class="cm-line"><span class="cm-keyword">let </span><span>x</span> = 1</div>"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Local projection endpoint.
struct Endpoint {
    url: String,
    connections: Arc<AtomicUsize>,
    frames: mpsc::UnboundedReceiver<String>,
}

impl Endpoint {
    /// Accept connections and forward their text frames.
    async fn start() -> Self {
        Self::spawn(false).await
    }

    /// Accept connections and close each one right after the handshake.
    async fn start_closing() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(close_immediately: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let (frame_tx, frames) = mpsc::unbounded_channel();

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let frame_tx = frame_tx.clone();
                tokio::spawn(async move {
                    if close_immediately {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            let _ = frame_tx.send(text.to_string());
                        }
                    }
                });
            }
        });

        Self {
            url,
            connections,
            frames,
        }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame as JSON, or `None` after `wait`.
    async fn next_frame(&mut self, wait: Duration) -> Option<Value> {
        let text = timeout(wait, self.frames.recv()).await.ok()??;
        Some(serde_json::from_str(&text).unwrap())
    }

    async fn expect_silence(&mut self, wait: Duration) {
        if let Some(frame) = self.next_frame(wait).await {
            panic!("unexpected frame: {frame}");
        }
    }
}

async fn wait_open(transport: &TransportChannel) {
    let mut states = transport.subscribe_state();
    timeout(
        Duration::from_secs(3),
        states.wait_for(|state| *state == ConnectionState::Open),
    )
    .await
    .expect("transport did not open")
    .unwrap();
}

fn bridge_config(endpoint: &Endpoint) -> BridgeConfig {
    BridgeConfig {
        mount_delay_ms: 10,
        ..BridgeConfig::default()
    }
    .with_endpoint(endpoint.url.clone())
    .with_username("alice")
}

/// Controller attached to a fresh buffer and view, connected and mounted.
async fn attached(
    endpoint: &Endpoint,
) -> (BridgeController, Arc<CollabText>, Arc<MemoryView>) {
    let config = bridge_config(endpoint);
    let transport = Arc::new(TransportChannel::from_config(&config));
    let controller = BridgeController::new(config, transport);
    let buffer = Arc::new(CollabText::default());
    let view = Arc::new(MemoryView::editor());

    controller.attach(buffer.clone(), view.clone());
    wait_open(controller.transport()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_mounted());
    (controller, buffer, view)
}

#[tokio::test]
async fn test_transport_connects_and_sends() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let transport = Arc::new(TransportChannel::new(
        endpoint.url.clone(),
        Duration::from_secs(1),
    ));

    assert!(transport.start());
    wait_open(&transport).await;
    assert!(transport.send_text(r#"{"hello":"world"}"#.to_string()));

    let frame = endpoint.next_frame(Duration::from_secs(2)).await.unwrap();
    assert_eq!(frame, json!({"hello": "world"}));
    assert_eq!(endpoint.connections(), 1);

    let stats = transport.stats();
    assert_eq!(stats.connect_attempts, 1);
    assert_eq!(stats.frames_sent, 1);
    transport.shutdown();
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    init_logging();
    let endpoint = Endpoint::start_closing().await;
    let transport = Arc::new(TransportChannel::new(
        endpoint.url.clone(),
        Duration::from_secs(1),
    ));
    transport.start();

    wait_open(&transport).await;
    let first_open = Instant::now();

    // Closed, then a new attempt after the reconnect delay.
    let mut states = transport.subscribe_state();
    timeout(
        Duration::from_secs(3),
        states.wait_for(|state| *state == ConnectionState::Closed),
    )
    .await
    .unwrap()
    .unwrap();
    timeout(
        Duration::from_secs(3),
        states.wait_for(|state| *state == ConnectionState::Open),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(first_open.elapsed() < Duration::from_millis(1800));
    assert!(endpoint.connections() >= 2);
    assert!(transport.stats().connect_attempts >= 2);
    transport.shutdown();
}

#[tokio::test]
async fn test_retries_forever_against_dead_port() {
    init_logging();
    let port = free_port().await;
    let transport = Arc::new(TransportChannel::new(
        format!("ws://127.0.0.1:{port}"),
        Duration::from_millis(50),
    ));
    transport.start();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(transport.stats().connect_attempts >= 3);
    assert_ne!(transport.state(), ConnectionState::Open);
    transport.shutdown();
}

#[tokio::test]
async fn test_edit_burst_sends_one_coalesced_frame() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, buffer, view) = attached(&endpoint).await;

    view.set_inner_html(selectors::CONTENT, LINE);
    buffer.push("let");
    buffer.push(" x");
    buffer.push(" = 1");

    let frame = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        frame,
        json!({
            "html": [{"ws": [
                {"w": "let", "c": "cm-keyword"},
                {"w": " ", "c": "cm-keyword"},
                {"w": "x", "c": "plain"},
                {"w": " ", "c": "plain"},
                {"w": "=", "c": "symbol"},
                {"w": " ", "c": "plain"},
                {"w": "1", "c": "symbol"},
            ]}],
            "address": "/flok",
            "username": "alice",
        })
    );
    endpoint.expect_silence(Duration::from_millis(150)).await;

    controller.transport().shutdown();
}

#[tokio::test]
async fn test_identical_scrolls_send_twice() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, _buffer, view) = attached(&endpoint).await;

    view.scroll_to(120.0);
    view.scroll_to(120.0);

    let expected = json!({"scrollTop": 120.0, "address": "/flok/scrollChange", "username": "alice"});
    for _ in 0..2 {
        let frame = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, expected);
    }

    controller.transport().shutdown();
}

#[tokio::test]
async fn test_caret_move_sends_only_on_change() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, _buffer, view) = attached(&endpoint).await;

    view.set_inner_html(selectors::CONTENT, LINE);
    view.move_caret(Rect::new(24.0, 8.0, 1.0, 16.0));
    let frame = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    assert_eq!(frame["address"], "/flok");
    assert!(frame["html"].is_array());

    // Same spot: the mutation is not a move.
    view.move_caret(Rect::new(24.0, 8.0, 1.0, 16.0));
    endpoint.expect_silence(Duration::from_millis(100)).await;

    view.move_caret(Rect::new(24.0, 26.0, 1.0, 16.0));
    assert!(endpoint.next_frame(Duration::from_secs(1)).await.is_some());

    controller.transport().shutdown();
}

#[tokio::test]
async fn test_detach_cancels_pending_send() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, buffer, view) = attached(&endpoint).await;

    view.set_inner_html(selectors::CONTENT, LINE);
    buffer.push("let x = 1");
    assert!(controller.has_pending_send());
    controller.detach();

    endpoint.expect_silence(Duration::from_millis(150)).await;
    view.scroll_to(10.0);
    endpoint.expect_silence(Duration::from_millis(50)).await;

    // Transport is still up for the next buffer.
    assert!(controller.transport().is_open());
    controller.transport().shutdown();
}

#[tokio::test]
async fn test_reattach_reuses_connection() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, _first, view) = attached(&endpoint).await;

    let second = Arc::new(CollabText::default());
    controller.attach(second.clone(), view.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    view.set_inner_html(selectors::CONTENT, LINE);
    second.push("let x = 1");
    let frame = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    assert_eq!(frame["html"][0]["ws"][0], json!({"w": "let", "c": "cm-keyword"}));

    assert_eq!(endpoint.connections(), 1);
    assert_eq!(controller.transport().stats().connect_attempts, 1);
    controller.transport().shutdown();
}

#[tokio::test]
async fn test_missing_markup_sends_empty_html() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let (controller, buffer, _view) = attached(&endpoint).await;

    buffer.push("hello");
    let frame = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        frame,
        json!({"html": "", "address": "/flok", "username": "alice"})
    );

    controller.transport().shutdown();
}

#[tokio::test]
async fn test_shared_transport_across_controllers() {
    init_logging();
    let mut endpoint = Endpoint::start().await;
    let transport = Arc::new(TransportChannel::new(
        endpoint.url.clone(),
        Duration::from_secs(1),
    ));
    let alice = BridgeController::new(bridge_config(&endpoint), transport.clone());
    let bob = BridgeController::with_runtime(
        bridge_config(&endpoint).with_username("bob"),
        transport.clone(),
        tokio::runtime::Handle::current(),
    );

    let alice_view = Arc::new(MemoryView::editor());
    let bob_view = Arc::new(MemoryView::editor());
    alice.attach(Arc::new(CollabText::default()), alice_view.clone());
    bob.attach(Arc::new(CollabText::default()), bob_view.clone());
    wait_open(&transport).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    alice_view.scroll_to(1.0);
    bob_view.scroll_to(5.5);
    let first = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    let second = endpoint.next_frame(Duration::from_secs(1)).await.unwrap();
    assert_eq!(first["username"], "alice");
    assert_eq!(second["username"], "bob");
    assert_eq!(second["scrollTop"], 5.5);

    // Both controllers went through the single socket.
    assert_eq!(endpoint.connections(), 1);
    assert_eq!(transport.stats().connect_attempts, 1);
    transport.shutdown();
}
