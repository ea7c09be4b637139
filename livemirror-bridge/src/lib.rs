//! # livemirror-bridge: Live editor broadcast bridge
//!
//! Watches a collaborative buffer and its rendered view, and streams the
//! styled text, caret moves and scroll offset to a projection endpoint over
//! a self-healing WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ text change ┌──────────────┐ 20ms ┌─────────────┐
//! │ TextSource  │ ──────────► │ Content      │ ───► │             │
//! └─────────────┘             │ Debouncer    │      │             │
//!                             └──────────────┘      │  extract()  │
//! ┌─────────────┐  mutations  ┌──────────────┐      │             │
//! │ Rendered    │ ──────────► │ CaretTracker │ ───► │             │
//! │ View        │             └──────────────┘      └──────┬──────┘
//! │             │  scroll                                  │
//! │             │ ─────────────────────────────┐           │
//! └─────────────┘                              ▼           ▼
//!                                       ┌──────────────────────┐
//!                                       │  TransportChannel    │ ──► ws://…
//!                                       │  (reconnects @ 1s)   │
//!                                       └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire format of broadcast payloads
//! - [`config`]: Endpoint, routing and timing settings
//! - [`view`]: DOM-like rendered view boundary and an in-memory view
//! - [`classifier`]: Caret change detection and content debouncing
//! - [`transport`]: Reconnecting WebSocket channel
//! - [`controller`]: Attach/detach lifecycle wiring everything together

pub mod classifier;
pub mod config;
pub mod controller;
pub mod protocol;
pub mod transport;
pub mod view;

// Re-exports for convenience
pub use classifier::{CaretSample, CaretTracker, ContentDebouncer};
pub use config::{BridgeConfig, ConfigError};
pub use controller::{Attachment, BridgeController};
pub use protocol::{BroadcastPayload, PayloadKind, ProtocolError};
pub use transport::{ConnectionState, TransportChannel, TransportError, TransportStats};
pub use view::{
    selectors, MemoryView, MutationBatch, MutationKind, MutationRecord, ObserveOptions, Rect,
    RenderedView, ScrollEvent,
};
