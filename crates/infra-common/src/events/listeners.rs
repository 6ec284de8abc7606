use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::invoke_isolated;

/// Listener ID returned by [`ListenerSet::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A set of listeners that all receive every emitted event
pub struct ListenerSet<E> {
    owner: String,
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E> ListenerSet<E> {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Add a listener; it receives events emitted after this call returns
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
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

    /// Deliver `event` to every listener; returns how many completed
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        let mut delivered = 0;
        for listener in snapshot {
            if invoke_isolated(&self.owner, || listener(event)) {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_every_listener_receives_event() {
        let set = ListenerSet::<u32>::new("test");
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            set.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        assert_eq!(set.emit(&5), 3);
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_unsubscribe() {
        let set = ListenerSet::<u32>::new("test");
        let id = set.subscribe(|_| {});
        assert_eq!(set.len(), 1);
        assert!(set.unsubscribe(id));
        assert!(!set.unsubscribe(id));
        assert!(set.is_empty());
    }

    #[test]
    fn test_throwing_listener_is_isolated() {
        let set = ListenerSet::<u32>::new("test");
        let seen = Arc::new(AtomicUsize::new(0));

        let s = seen.clone();
        set.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        set.subscribe(|_| panic!("listener failure"));
        let s = seen.clone();
        set.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(set.emit(&1), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
