//! Rendered view boundary.
//!
//! The bridge reads the editor's rendered view the way a script reads a
//! DOM: elements are looked up by class, and geometry, markup and scroll
//! offset are read on demand. It never writes to the view.
//!
//! [`MemoryView`] is an in-process implementation for headless hosts and
//! tests: the host pushes markup, caret geometry and scroll offset into it,
//! and it emits the matching mutation and scroll notifications.

use std::collections::HashMap;
use std::sync::Arc;

use livemirror_core::{Listener, ListenerRegistry, SubscriptionToken};
use parking_lot::RwLock;

/// Class selectors of the editor elements the bridge reads.
pub mod selectors {
    /// One rendered line.
    pub const LINE: &str = "cm-line";
    /// Caret marker of the collaborative selection layer.
    pub const CARET: &str = "cm-ySelectionCaret";
    /// Container of all rendered lines.
    pub const CONTENT: &str = "cm-content";
    /// Scrollable editor container.
    pub const SCROLLER: &str = "cm-theme";
}

/// On-screen box of an element, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// What kind of change a mutation record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
    Attributes,
}

/// One observed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// Whether the change happened below the observed element rather than on it.
    pub subtree: bool,
}

impl MutationRecord {
    pub fn new(kind: MutationKind, subtree: bool) -> Self {
        Self { kind, subtree }
    }
}

/// Records delivered together to a mutation observer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

/// Which mutations an observer wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub character_data: bool,
    pub attributes: bool,
}

impl ObserveOptions {
    /// Structural and text changes anywhere below the element.
    pub const SUBTREE_CONTENT: ObserveOptions = ObserveOptions {
        child_list: true,
        subtree: true,
        character_data: true,
        attributes: false,
    };

    pub fn accepts(&self, record: &MutationRecord) -> bool {
        let kind = match record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Attributes => self.attributes,
        };
        kind && (self.subtree || !record.subtree)
    }
}

/// A scroll event on a scrollable element. Read the offset from the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollEvent;

/// Read-only, DOM-like access to the editor's rendered view.
///
/// Every lookup returns `None` while the element is not mounted.
pub trait RenderedView: Send + Sync {
    /// Markup inside the first element with `class`.
    fn inner_html(&self, class: &str) -> Option<String>;

    /// Box of the first element with `class`.
    fn bounding_rect(&self, class: &str) -> Option<Rect>;

    /// Vertical scroll offset of the first element with `class`.
    fn scroll_top(&self, class: &str) -> Option<f64>;

    /// Observe mutations of the element with `class`.
    fn observe_mutations(
        &self,
        class: &str,
        options: ObserveOptions,
        handler: Listener<MutationBatch>,
    ) -> Option<SubscriptionToken>;

    /// Listen to scroll events of the element with `class`.
    fn add_scroll_listener(
        &self,
        class: &str,
        handler: Listener<ScrollEvent>,
    ) -> Option<SubscriptionToken>;

    /// Drop a mutation observer or scroll listener.
    fn remove_listener(&self, token: SubscriptionToken) -> bool;
}

#[derive(Default)]
struct ElementState {
    inner_html: Option<String>,
    rect: Option<Rect>,
    scroll_top: f64,
    mutations: Arc<ListenerRegistry<MutationBatch>>,
    scrolls: Arc<ListenerRegistry<ScrollEvent>>,
}

/// In-memory rendered view.
#[derive(Default)]
pub struct MemoryView {
    elements: RwLock<HashMap<String, ElementState>>,
}

impl MemoryView {
    /// An empty view with nothing mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A view with the editor's content and scroll containers mounted.
    pub fn editor() -> Self {
        let view = Self::new();
        view.mount(selectors::CONTENT);
        view.mount(selectors::SCROLLER);
        view
    }

    /// Mount an element. Mounting twice keeps the existing state.
    pub fn mount(&self, class: &str) {
        self.elements
            .write()
            .entry(class.to_string())
            .or_default();
    }

    /// Unmount an element, dropping its listeners.
    pub fn unmount(&self, class: &str) -> bool {
        self.elements.write().remove(class).is_some()
    }

    pub fn is_mounted(&self, class: &str) -> bool {
        self.elements.read().contains_key(class)
    }

    /// Replace the editor's rendered lines and notify content observers.
    pub fn render(&self, html: impl Into<String>) {
        self.set_inner_html(selectors::CONTENT, html);
        self.notify_mutations(
            selectors::CONTENT,
            vec![
                MutationRecord::new(MutationKind::ChildList, true),
                MutationRecord::new(MutationKind::CharacterData, true),
            ],
        );
    }

    /// Move the caret marker and notify content observers, as the caret
    /// widget is re-rendered inside the content container.
    pub fn move_caret(&self, rect: Rect) {
        self.mount(selectors::CARET);
        self.set_rect(selectors::CARET, rect);
        self.notify_mutations(
            selectors::CONTENT,
            vec![MutationRecord::new(MutationKind::ChildList, true)],
        );
    }

    /// Scroll the editor container and fire a scroll event.
    pub fn scroll_to(&self, scroll_top: f64) {
        self.set_scroll_top(selectors::SCROLLER, scroll_top);
        self.notify_scroll(selectors::SCROLLER);
    }

    /// Set markup without notifying anyone. Mounts the element if needed.
    pub fn set_inner_html(&self, class: &str, html: impl Into<String>) {
        self.elements
            .write()
            .entry(class.to_string())
            .or_default()
            .inner_html = Some(html.into());
    }

    /// Set geometry without notifying anyone. Mounts the element if needed.
    pub fn set_rect(&self, class: &str, rect: Rect) {
        self.elements
            .write()
            .entry(class.to_string())
            .or_default()
            .rect = Some(rect);
    }

    /// Set scroll offset without notifying anyone. Mounts the element if needed.
    pub fn set_scroll_top(&self, class: &str, scroll_top: f64) {
        self.elements
            .write()
            .entry(class.to_string())
            .or_default()
            .scroll_top = scroll_top;
    }

    /// Deliver a mutation batch to the observers of `class`.
    ///
    /// Each observer only sees the records its options accept and is
    /// skipped when none match. Returns how many observers were called.
    pub fn notify_mutations(&self, class: &str, records: Vec<MutationRecord>) -> usize {
        let Some(registry) = self.mutation_registry(class) else {
            return 0;
        };
        registry.emit(&MutationBatch { records })
    }

    /// Fire a scroll event on `class`. Returns how many listeners ran.
    pub fn notify_scroll(&self, class: &str) -> usize {
        let registry = self
            .elements
            .read()
            .get(class)
            .map(|element| element.scrolls.clone());
        registry.map_or(0, |registry| registry.emit(&ScrollEvent))
    }

    /// Mutation observers plus scroll listeners currently attached to `class`.
    pub fn listener_count(&self, class: &str) -> usize {
        self.elements
            .read()
            .get(class)
            .map_or(0, |element| element.mutations.len() + element.scrolls.len())
    }

    fn mutation_registry(&self, class: &str) -> Option<Arc<ListenerRegistry<MutationBatch>>> {
        self.elements
            .read()
            .get(class)
            .map(|element| element.mutations.clone())
    }
}

impl RenderedView for MemoryView {
    fn inner_html(&self, class: &str) -> Option<String> {
        self.elements.read().get(class)?.inner_html.clone()
    }

    fn bounding_rect(&self, class: &str) -> Option<Rect> {
        self.elements.read().get(class)?.rect
    }

    fn scroll_top(&self, class: &str) -> Option<f64> {
        self.elements
            .read()
            .get(class)
            .map(|element| element.scroll_top)
    }

    fn observe_mutations(
        &self,
        class: &str,
        options: ObserveOptions,
        handler: Listener<MutationBatch>,
    ) -> Option<SubscriptionToken> {
        let registry = self.mutation_registry(class)?;
        let filtered: Listener<MutationBatch> = Arc::new(move |batch: &MutationBatch| {
            let records: Vec<MutationRecord> = batch
                .records
                .iter()
                .filter(|record| options.accepts(record))
                .copied()
                .collect();
            if !records.is_empty() {
                handler(&MutationBatch { records });
            }
        });
        Some(registry.subscribe(filtered))
    }

    fn add_scroll_listener(
        &self,
        class: &str,
        handler: Listener<ScrollEvent>,
    ) -> Option<SubscriptionToken> {
        let elements = self.elements.read();
        let element = elements.get(class)?;
        Some(element.scrolls.subscribe(handler))
    }

    fn remove_listener(&self, token: SubscriptionToken) -> bool {
        self.elements
            .read()
            .values()
            .any(|element| element.mutations.unsubscribe(token) || element.scrolls.unsubscribe(token))
    }
}
