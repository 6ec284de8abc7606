//! A periodic ticker that is not tied to any UI reactivity layer.
//!
//! Consumers start an [`Interval`] with a tick callback and keep the returned
//! [`IntervalHandle`]; dropping the handle or calling [`IntervalHandle::stop`]
//! ends the ticker. The first tick happens one full period after start.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Periodic ticker factory
pub struct Interval;

impl Interval {
    /// Spawn a ticker calling `tick` every `period`
    pub fn start<F>(name: impl Into<String>, period: Duration, mut tick: F) -> IntervalHandle
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let token = CancellationToken::new();
        let child = token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => {
                        trace!("Interval {} stopped", task_name);
                        break;
                    }
                    _ = ticker.tick() => {
                        // a stop issued while this tick was pending wins
                        if child.is_cancelled() {
                            break;
                        }
                        tick();
                    }
                }
            }
        });

        IntervalHandle {
            name,
            token,
            handle: Some(handle),
        }
    }
}

/// Owning handle for a running [`Interval`]
#[derive(Debug)]
pub struct IntervalHandle {
    name: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl IntervalHandle {
    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
