//! Collaborative text buffer boundary.
//!
//! The bridge only needs three things from the shared buffer: the current
//! string, a change notification, and a way to stop listening. [`TextSource`]
//! captures that; [`CollabText`] implements it over a `yrs` text root.
//!
//! Change handlers run inside the CRDT's commit. They must not read the
//! buffer synchronously; schedule the read instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use yrs::updates::decoder::Decode;
use yrs::{
    Doc, GetString, Observable, ReadTxn, StateVector, Subscription, Text, TextRef, Transact,
    Update,
};

use crate::subscription::{Listener, ListenerRegistry, SubscriptionToken};

/// Errors raised while exchanging CRDT updates.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("failed to decode update: {0}")]
    Decode(String),
    #[error("failed to apply update: {0}")]
    Apply(String),
}

impl From<yrs::encoding::read::Error> for BufferError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        BufferError::Decode(e.to_string())
    }
}

/// Notification that the text changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    /// Count of committed changes seen by this buffer, starting at 1.
    pub revision: u64,
}

/// Read side of a collaborative text buffer.
pub trait TextSource: Send + Sync {
    /// Current raw text.
    fn snapshot(&self) -> String;

    /// Register a change handler.
    fn observe(&self, handler: Listener<TextChange>) -> SubscriptionToken;

    /// Remove a change handler. Returns `false` if the token is unknown.
    fn unobserve(&self, token: SubscriptionToken) -> bool;
}

/// A `yrs` text root with explicit change subscriptions.
pub struct CollabText {
    doc: Doc,
    text: TextRef,
    listeners: Arc<ListenerRegistry<TextChange>>,
    revision: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl CollabText {
    /// Name of the text root used by [`CollabText::default`].
    pub const DEFAULT_ROOT: &'static str = "text";

    /// Create a buffer over a fresh document.
    pub fn new(root: &str) -> Self {
        Self::with_doc(Doc::new(), root)
    }

    /// Create a buffer over the `root` text of an existing document.
    pub fn with_doc(doc: Doc, root: &str) -> Self {
        let text = doc.get_or_insert_text(root);
        let listeners: Arc<ListenerRegistry<TextChange>> = Arc::new(ListenerRegistry::new());
        let revision = Arc::new(AtomicU64::new(0));

        let subscription = {
            let listeners = listeners.clone();
            let revision = revision.clone();
            text.observe(move |_txn, _event| {
                let revision = revision.fetch_add(1, Ordering::SeqCst) + 1;
                listeners.emit(&TextChange { revision });
            })
        };

        Self {
            doc,
            text,
            listeners,
            revision,
            _subscription: subscription,
        }
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Length of the text in the document's offset units.
    pub fn len(&self) -> u32 {
        let txn = self.doc.transact();
        self.text.len(&txn)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `chunk` at `index` as a local edit.
    pub fn insert(&self, index: u32, chunk: &str) {
        let mut txn = self.doc.transact_mut();
        self.text.insert(&mut txn, index, chunk);
    }

    /// Append `chunk` as a local edit.
    pub fn push(&self, chunk: &str) {
        let mut txn = self.doc.transact_mut();
        self.text.push(&mut txn, chunk);
    }

    /// Remove `len` units starting at `index` as a local edit.
    pub fn remove_range(&self, index: u32, len: u32) {
        let mut txn = self.doc.transact_mut();
        self.text.remove_range(&mut txn, index, len);
    }

    /// Full document state, encoded as a v1 update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Merge an update produced by another replica.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), BufferError> {
        let update = Update::decode_v1(update).map_err(|e| {
            log::warn!("rejecting undecodable update ({} bytes): {}", update.len(), e);
            BufferError::from(e)
        })?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update).map_err(|e| {
            log::warn!("failed to apply remote update: {e:?}");
            BufferError::Apply(format!("{e:?}"))
        })?;
        log::trace!("applied remote update");
        Ok(())
    }

    /// Number of committed changes observed so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of registered change handlers.
    pub fn observer_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for CollabText {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

impl TextSource for CollabText {
    fn snapshot(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    fn observe(&self, handler: Listener<TextChange>) -> SubscriptionToken {
        self.listeners.subscribe(handler)
    }

    fn unobserve(&self, token: SubscriptionToken) -> bool {
        self.listeners.unsubscribe(token)
    }
}
