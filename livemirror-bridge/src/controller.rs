//! Attach/detach lifecycle of the bridge.
//!
//! [`BridgeController::attach`] wires one buffer and its rendered view to the
//! transport:
//!
//! 1. starts the transport (once per channel),
//! 2. subscribes a debounced content sender to buffer changes,
//! 3. after the mount delay, hooks the scroll listener and the caret
//!    mutation observer into the view.
//!
//! [`Attachment::detach`] undoes all of it except the transport, which stays
//! up for the next buffer.

use std::sync::Arc;

use livemirror_core::{
    extract, LineUnit, MarkupTree, SubscriptionToken, TextChange, TextSource,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::classifier::{CaretSample, CaretTracker, ContentDebouncer};
use crate::config::BridgeConfig;
use crate::protocol::BroadcastPayload;
use crate::transport::TransportChannel;
use crate::view::{selectors, MutationBatch, ObserveOptions, RenderedView, ScrollEvent};

/// Builds payloads from the current buffer and view state and sends them.
struct Broadcaster {
    config: BridgeConfig,
    transport: Arc<TransportChannel>,
    buffer: Arc<dyn TextSource>,
    view: Arc<dyn RenderedView>,
}

impl Broadcaster {
    /// Styled lines of the current state. `None` while the view has no markup.
    fn lines(&self) -> Option<Vec<LineUnit>> {
        // Trailing space so a caret parked at the very end has a char to sit on.
        let raw = format!("{} ", self.buffer.snapshot());
        let html = self.view.inner_html(selectors::CONTENT)?;
        let html = html.trim();
        if html.is_empty() {
            return None;
        }
        match MarkupTree::parse(html) {
            Ok(tree) => extract(&raw, Some(&tree)),
            Err(e) => {
                log::warn!("ignoring unreadable editor markup: {}", e);
                None
            }
        }
    }

    fn send_content(&self) {
        if !self.transport.is_open() {
            self.transport.record_drop();
            return;
        }
        let payload = BroadcastPayload::content(
            self.lines(),
            self.config.content_address.as_str(),
            self.config.username.as_str(),
        );
        self.transport.send(&payload);
    }

    fn send_caret_move(&self) {
        if !self.transport.is_open() {
            self.transport.record_drop();
            return;
        }
        let payload = BroadcastPayload::caret_move(
            self.lines(),
            self.config.content_address.as_str(),
            self.config.username.as_str(),
        );
        self.transport.send(&payload);
    }

    fn send_scroll(&self) {
        if !self.transport.is_open() {
            self.transport.record_drop();
            return;
        }
        let offset = self.view.scroll_top(selectors::SCROLLER).unwrap_or(0.0);
        let payload = BroadcastPayload::scroll(
            offset,
            self.config.scroll_address.as_str(),
            self.config.username.as_str(),
        );
        self.transport.send(&payload);
    }
}

/// View hooks installed by the mount task.
#[derive(Default)]
struct ViewHooks {
    detached: bool,
    mounted: bool,
    tokens: Vec<SubscriptionToken>,
}

/// One buffer wired to the transport.
///
/// Dropping it detaches.
pub struct Attachment {
    buffer: Arc<dyn TextSource>,
    view: Arc<dyn RenderedView>,
    buffer_token: SubscriptionToken,
    content: Arc<ContentDebouncer>,
    caret: Arc<CaretTracker>,
    hooks: Arc<Mutex<ViewHooks>>,
    mount: JoinHandle<()>,
}

impl Attachment {
    /// Unhook everything. Idempotent.
    pub fn detach(&self) {
        let tokens = {
            let mut hooks = self.hooks.lock();
            if hooks.detached {
                return;
            }
            hooks.detached = true;
            std::mem::take(&mut hooks.tokens)
        };

        self.buffer.unobserve(self.buffer_token);
        self.content.close();
        self.mount.abort();
        for token in tokens {
            self.view.remove_listener(token);
        }
        log::debug!("bridge detached");
    }

    pub fn is_detached(&self) -> bool {
        self.hooks.lock().detached
    }

    /// Whether the view hooks are in place.
    pub fn is_mounted(&self) -> bool {
        let hooks = self.hooks.lock();
        hooks.mounted && !hooks.detached
    }

    /// Whether a debounced content send is waiting to fire.
    pub fn has_pending_send(&self) -> bool {
        self.content.is_pending()
    }

    /// Last caret position seen in the view.
    pub fn caret(&self) -> CaretSample {
        self.caret.last()
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Owns the current [`Attachment`] and the shared transport.
pub struct BridgeController {
    config: BridgeConfig,
    transport: Arc<TransportChannel>,
    runtime: Handle,
    current: Mutex<Option<Attachment>>,
}

impl BridgeController {
    /// Controller over the process-wide `transport`, running on the current
    /// runtime. Every controller of the process should share one channel.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: BridgeConfig, transport: Arc<TransportChannel>) -> Self {
        Self::with_runtime(config, transport, Handle::current())
    }

    /// Like [`BridgeController::new`], spawning on `runtime`.
    pub fn with_runtime(
        config: BridgeConfig,
        transport: Arc<TransportChannel>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            transport,
            runtime,
            current: Mutex::new(None),
        }
    }

    /// Wire `buffer` and `view` to the transport, replacing any previous
    /// attachment.
    pub fn attach(&self, buffer: Arc<dyn TextSource>, view: Arc<dyn RenderedView>) {
        self.detach();

        if self.transport.start_on(&self.runtime) {
            log::info!("bridge transport started for {}", self.transport.url());
        }

        let broadcaster = Arc::new(Broadcaster {
            config: self.config.clone(),
            transport: self.transport.clone(),
            buffer: buffer.clone(),
            view: view.clone(),
        });

        let content = {
            let broadcaster = broadcaster.clone();
            Arc::new(ContentDebouncer::new(
                self.config.content_debounce(),
                self.runtime.clone(),
                Arc::new(move || broadcaster.send_content()),
            ))
        };

        let buffer_token = {
            let content = content.clone();
            buffer.observe(Arc::new(move |_: &TextChange| {
                content.trigger();
            }))
        };

        let caret = Arc::new(CaretTracker::new());
        let hooks = Arc::new(Mutex::new(ViewHooks::default()));

        let mount = {
            let delay = self.config.mount_delay();
            let hooks = hooks.clone();
            let caret = caret.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                mount_view_hooks(&broadcaster, &caret, &hooks);
            })
        };

        *self.current.lock() = Some(Attachment {
            buffer,
            view,
            buffer_token,
            content,
            caret,
            hooks,
            mount,
        });
        log::debug!("bridge attached as {}", self.config.username);
    }

    /// Drop the current attachment, if any. The transport stays up.
    pub fn detach(&self) -> bool {
        let previous = self.current.lock().take();
        match previous {
            Some(attachment) => {
                attachment.detach();
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Whether the current attachment has hooked the view.
    pub fn is_mounted(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(Attachment::is_mounted)
    }

    /// Whether the current attachment has a content send waiting to fire.
    pub fn has_pending_send(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(Attachment::has_pending_send)
    }

    pub fn transport(&self) -> &Arc<TransportChannel> {
        &self.transport
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for BridgeController {
    fn drop(&mut self) {
        self.detach();
    }
}

fn mount_view_hooks(
    broadcaster: &Arc<Broadcaster>,
    caret: &Arc<CaretTracker>,
    hooks: &Mutex<ViewHooks>,
) {
    let mut hooks = hooks.lock();
    if hooks.detached {
        return;
    }
    let view = &broadcaster.view;

    let on_scroll = {
        let broadcaster = broadcaster.clone();
        Arc::new(move |_: &ScrollEvent| broadcaster.send_scroll())
    };
    match view.add_scroll_listener(selectors::SCROLLER, on_scroll) {
        Some(token) => hooks.tokens.push(token),
        None => log::debug!("no {} element; scroll not mirrored", selectors::SCROLLER),
    }

    let on_mutation = {
        let broadcaster = broadcaster.clone();
        let caret = caret.clone();
        Arc::new(move |_: &MutationBatch| {
            let Some(rect) = broadcaster.view.bounding_rect(selectors::CARET) else {
                return;
            };
            if caret.observe(rect.into()) {
                broadcaster.send_caret_move();
            }
        })
    };
    match view.observe_mutations(selectors::CONTENT, ObserveOptions::SUBTREE_CONTENT, on_mutation) {
        Some(token) => hooks.tokens.push(token),
        None => log::debug!("no {} element; caret not mirrored", selectors::CONTENT),
    }

    hooks.mounted = true;
}
