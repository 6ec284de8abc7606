//! Synchronous in-process event fan-out.
//!
//! [`EventDispatchTable`] routes each event to the handlers registered for its
//! kind. [`ListenerSet`] delivers every event to every listener. Both snapshot
//! their handlers before invoking them, so a handler may register or remove
//! handlers on the same table while it runs, and both isolate handler panics:
//! a panicking handler is logged and the remaining handlers still run.

pub mod dispatch;
pub mod listeners;

pub use dispatch::{DispatchEvent, EventDispatchTable, HandlerId};
pub use listeners::{ListenerId, ListenerSet};

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run one handler, containing any panic it raises.
///
/// Returns `false` when the handler panicked.
pub(crate) fn invoke_isolated(owner: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Event handler on {} panicked: {}", owner, message);
            false
        }
    }
}
