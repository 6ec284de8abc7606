//! Owner-scoped timer bookkeeping.
//!
//! Every callback scheduled through a [`TimerRegistry`] is a tracked tokio task.
//! A callback runs only if, at the moment its delay elapses:
//!
//! 1. the registry has not been destroyed,
//! 2. the callback has not been cancelled individually, by its owner being torn
//!    down, or by a bulk [`TimerRegistry::cancel_all`], and
//! 3. for owner-scoped callbacks, the owner is still live according to the
//!    registry's [`OwnerLiveness`] probe.
//!
//! Cancellation aborts the task, and the fire-time check closes the window
//! where a cancel and a fire land on the same tick.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Predicate telling the registry whether an owner still exists
pub type OwnerLiveness = Arc<dyn Fn(&str) -> bool + Send + Sync>;

struct TimerEntry {
    owner: Option<String>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    timers: HashMap<u64, TimerEntry>,
    by_owner: HashMap<String, Vec<u64>>,
}

impl RegistryState {
    fn forget(&mut self, id: u64) -> Option<TimerEntry> {
        let entry = self.timers.remove(&id)?;
        if let Some(owner) = &entry.owner {
            if let Some(ids) = self.by_owner.get_mut(owner) {
                ids.retain(|t| *t != id);
                if ids.is_empty() {
                    self.by_owner.remove(owner);
                }
            }
        }
        Some(entry)
    }
}

struct Shared {
    name: String,
    state: Mutex<RegistryState>,
    destroyed: AtomicBool,
    epoch: AtomicU64,
    next_id: AtomicU64,
    liveness: Option<OwnerLiveness>,
}

impl Shared {
    fn owner_alive(&self, owner: &str) -> bool {
        self.liveness.as_ref().map_or(true, |alive| alive(owner))
    }
}

/// Handle to one scheduled callback
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    shared: Weak<Shared>,
}

impl TimerHandle {
    /// Cancel this callback. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let entry = shared.state.lock().forget(self.id);
        match entry {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").field("name", &self.name).finish()
    }
}

/// Registry of delayed callbacks, optionally tied to an owning entity
#[derive(Clone)]
pub struct TimerRegistry {
    shared: Arc<Shared>,
}

impl TimerRegistry {
    /// Create a registry whose owner-scoped callbacks are never vetoed by liveness
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a registry that consults `liveness` before firing owner-scoped callbacks
    pub fn with_liveness(name: impl Into<String>, liveness: OwnerLiveness) -> Self {
        Self::build(name.into(), Some(liveness))
    }

    fn build(name: String, liveness: Option<OwnerLiveness>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(RegistryState::default()),
                destroyed: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
                liveness,
            }),
        }
    }

    /// Schedule `callback` after `delay` with no owner
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_inner(delay, None, callback)
    }

    /// Schedule `callback` after `delay`, owned by `owner`
    pub fn schedule_for<F>(&self, owner: &str, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_inner(delay, Some(owner.to_string()), callback)
    }

    fn schedule_inner<F>(&self, delay: Duration, owner: Option<String>, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = self.shared.clone();
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let task_owner = owner.clone();
        let task_shared = Arc::downgrade(&shared);

        // The lock is held across spawn so the task cannot look itself up before it is recorded.
        let mut state = shared.state.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = task_shared.upgrade() else {
                return;
            };
            let tracked = shared.state.lock().forget(id).is_some();
            if !tracked {
                return;
            }
            if shared.destroyed.load(Ordering::SeqCst) {
                debug!("{}: timer {} suppressed, registry destroyed", shared.name, id);
                return;
            }
            if shared.epoch.load(Ordering::SeqCst) != epoch {
                debug!("{}: timer {} suppressed, registry reset", shared.name, id);
                return;
            }
            if let Some(owner) = &task_owner {
                if !shared.owner_alive(owner) {
                    debug!("{}: timer {} suppressed, owner {} is gone", shared.name, id, owner);
                    return;
                }
            }
            callback();
        });

        if let Some(owner) = &owner {
            state.by_owner.entry(owner.clone()).or_default().push(id);
        }
        state.timers.insert(id, TimerEntry { owner, handle });

        TimerHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Cancel every pending callback owned by `owner`; returns how many were cancelled
    pub fn cancel_owner(&self, owner: &str) -> usize {
        let entries: Vec<TimerEntry> = {
            let mut state = self.shared.state.lock();
            let ids = state.by_owner.remove(owner).unwrap_or_default();
            ids.into_iter().filter_map(|id| state.timers.remove(&id)).collect()
        };
        for entry in &entries {
            entry.handle.abort();
        }
        if !entries.is_empty() {
            debug!("{}: cancelled {} timer(s) owned by {}", self.shared.name, entries.len(), owner);
        }
        entries.len()
    }

    /// Cancel every pending callback
    pub fn cancel_all(&self) -> usize {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let entries: Vec<TimerEntry> = {
            let mut state = self.shared.state.lock();
            state.by_owner.clear();
            state.timers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.handle.abort();
        }
        debug!("{}: cancelled all {} pending timer(s)", self.shared.name, entries.len());
        entries.len()
    }

    /// Permanently suppress pending callbacks until [`revive`](Self::revive)
    pub fn destroy(&self) {
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.cancel_all();
    }

    /// Clear the destroyed flag so the registry can schedule again
    pub fn revive(&self) {
        self.shared.destroyed.store(false, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// Number of callbacks that have neither fired nor been cancelled
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().timers.len()
    }

    pub fn owner_pending_count(&self, owner: &str) -> usize {
        self.shared
            .state
            .lock()
            .by_owner
            .get(owner)
            .map_or(0, Vec::len)
    }
}
