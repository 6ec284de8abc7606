use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use super::invoke_isolated;

/// An event payload that knows which named slot it is dispatched on.
///
/// Usually implemented by a tagged enum whose `Kind` is a field-less mirror
/// of its variants, so handler registration is checked by the compiler.
pub trait DispatchEvent: Send + Sync + 'static {
    /// Event name type
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The slot this event is emitted on
    fn kind(&self) -> Self::Kind;
}

/// Handler ID for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: HandlerId,
    handler: Handler<E>,
    once: bool,
}

/// Per-entity mapping from event kind to an ordered list of handlers
pub struct EventDispatchTable<E: DispatchEvent> {
    owner: String,
    handlers: Mutex<HashMap<E::Kind, Vec<Entry<E>>>>,
    next_id: AtomicU64,
}

impl<E: DispatchEvent> EventDispatchTable<E> {
    /// Create an empty table; `owner` only labels log lines
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn register(&self, kind: E::Kind, handler: Handler<E>, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push(Entry { id, handler, once });
        id
    }

    /// Register a handler for `kind`
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), false)
    }

    /// Register a handler that fires at most once and then removes itself
    pub fn once<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(handler), true)
    }

    /// Remove exactly the handler registered under `id`
    pub fn off(&self, kind: E::Kind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(entries) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    /// Drop every handler for one kind
    pub fn remove_listeners(&self, kind: E::Kind) {
        self.handlers.lock().remove(&kind);
    }

    /// Drop every handler for every kind
    pub fn remove_all_listeners(&self) {
        self.handlers.lock().clear();
    }

    /// Number of handlers registered for `kind`
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, kind: E::Kind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Invoke every handler registered for the event's kind, in registration
    /// order. Returns how many handlers ran to completion.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Handler<E>> = {
            let mut handlers = self.handlers.lock();
            let Some(entries) = handlers.get_mut(&kind) else {
                return 0;
            };
            let snapshot = entries.iter().map(|e| e.handler.clone()).collect();
            // once-handlers leave before they run so a re-entrant emit cannot fire them twice
            entries.retain(|e| !e.once);
            if entries.is_empty() {
                handlers.remove(&kind);
            }
            snapshot
        };

        trace!("{} emitting {:?} to {} handler(s)", self.owner, kind, snapshot.len());
        snapshot
            .into_iter()
            .filter(|handler| invoke_isolated(&self.owner, || handler(event)))
            .count()
    }
}
