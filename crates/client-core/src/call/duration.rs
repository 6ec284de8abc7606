//! Elapsed-time tracking for a connected call.
//!
//! The tracker ticks while the call is connected and reports whole seconds
//! since the answer. Stopping freezes the last value; only [`reset`] returns
//! it to zero.
//!
//! [`reset`]: DurationTracker::reset

use parking_lot::Mutex;
use sipmesh_infra_common::{Interval, IntervalHandle, ListenerId, ListenerSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Default)]
struct Elapsed {
    seconds: u64,
    answered_at: Option<Instant>,
}

pub struct DurationTracker {
    tick: Duration,
    elapsed: Arc<Mutex<Elapsed>>,
    listeners: Arc<ListenerSet<u64>>,
    ticker: Mutex<Option<IntervalHandle>>,
}

impl DurationTracker {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            elapsed: Arc::new(Mutex::new(Elapsed::default())),
            listeners: Arc::new(ListenerSet::new("call-duration")),
            ticker: Mutex::new(None),
        }
    }

    /// Start ticking from `answered_at`; no-op while already running
    pub fn start(&self, answered_at: Instant) {
        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(IntervalHandle::is_running) {
            return;
        }
        self.elapsed.lock().answered_at = Some(answered_at);

        let elapsed = self.elapsed.clone();
        let listeners = self.listeners.clone();
        *ticker = Some(Interval::start("call-duration", self.tick, move || {
            let seconds = {
                let mut elapsed = elapsed.lock();
                let Some(answered_at) = elapsed.answered_at else {
                    return;
                };
                elapsed.seconds = answered_at.elapsed().as_secs();
                elapsed.seconds
            };
            trace!("Call duration {}s", seconds);
            listeners.emit(&seconds);
        }));
    }

    /// Stop ticking and keep the last value
    pub fn stop(&self) {
        if let Some(mut ticker) = self.ticker.lock().take() {
            ticker.stop();
        }
    }

    /// Stop and return to zero
    pub fn reset(&self) {
        self.stop();
        *self.elapsed.lock() = Elapsed::default();
        self.listeners.emit(&0);
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.lock().seconds
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().as_ref().is_some_and(IntervalHandle::is_running)
    }

    /// Receive the elapsed seconds on every tick and on reset
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&u64) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}
