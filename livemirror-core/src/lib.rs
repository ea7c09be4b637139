//! # livemirror-core: Live-state extraction for the broadcast bridge
//!
//! Turns a collaboratively edited text buffer plus its rendered markup into
//! a word-aligned, style-annotated line sequence that a projection client
//! can redraw without running an editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   snapshot()    ┌──────────────┐
//! │ CollabText  │ ──────────────► │              │
//! │ (yrs text)  │                 │   extract()  │ ──► Vec<LineUnit>
//! └──────┬──────┘                 │              │
//!        │ observe()              └──────▲───────┘
//!        ▼                               │ MarkupTree
//! ┌─────────────┐                 ┌──────┴───────┐
//! │ Listener    │                 │ innerHTML    │
//! │ Registry    │                 │ (tl parser)  │
//! └─────────────┘                 └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`markup`]: Tagged markup tree parsed from rendered `innerHTML`
//! - [`extract`]: Formatting extractor (raw text × markup → lines of words)
//! - [`subscription`]: Explicit listener registries with unsubscribe tokens
//! - [`text`]: Collaborative text buffer boundary backed by `yrs`

pub mod extract;
pub mod markup;
pub mod subscription;
pub mod text;

// Re-exports for convenience
pub use extract::{extract, LineUnit, WordUnit};
pub use markup::{MarkupError, MarkupNode, MarkupTree};
pub use subscription::{Listener, ListenerRegistry, SubscriptionToken};
pub use text::{BufferError, CollabText, TextChange, TextSource};
