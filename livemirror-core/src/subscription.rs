//! Explicit listener registries.
//!
//! Every event source (text changes, view mutations, scroll) keeps its
//! handlers in a [`ListenerRegistry`] and hands back a [`SubscriptionToken`].
//! Whoever subscribed holds the token and uses it to unsubscribe, so no
//! observer outlives the attachment that registered it.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

impl SubscriptionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared event handler.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of handlers for one event type.
pub struct ListenerRegistry<E> {
    listeners: Mutex<Vec<(SubscriptionToken, Listener<E>)>>,
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler. Handlers run in subscription order.
    pub fn subscribe(&self, listener: Listener<E>) -> SubscriptionToken {
        let token = SubscriptionToken::new();
        self.listeners.lock().push((token, listener));
        token
    }

    /// Remove a handler. Returns `false` if the token is unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(t, _)| *t != token);
        listeners.len() != before
    }

    /// Deliver `event` to every handler, returning how many ran.
    ///
    /// The list is snapshotted first, so handlers may (un)subscribe freely.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
