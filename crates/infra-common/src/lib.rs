//! # sipmesh infra-common
//!
//! Shared building blocks for the sipmesh crates:
//!
//! - [`timers`] - a [`TimerRegistry`] of owner-scoped delayed callbacks and an
//!   [`Interval`] ticker
//! - [`events`] - keyed [`EventDispatchTable`] and all-events [`ListenerSet`]
//! - [`sync`] - the [`OperationGuard`] busy flag and the
//!   [`AbortController`]/[`AbortSignal`] cooperative cancellation pair
//! - [`logging`] - `tracing-subscriber` setup
//! - [`config`] - serde helpers for configuration structs
//!
//! Everything here is instance-owned. Two mock servers or two conference
//! orchestrators in the same process never share timers or handlers.

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod sync;
pub mod timers;

pub use errors::{Error, Result};
pub use events::{DispatchEvent, EventDispatchTable, HandlerId, ListenerId, ListenerSet};
pub use sync::{AbortController, AbortSignal, GuardPermit, OperationGuard};
pub use timers::{Interval, IntervalHandle, TimerHandle, TimerRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
