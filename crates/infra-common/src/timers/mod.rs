//! Delayed callbacks and periodic tickers backed by tokio tasks

pub mod interval;
pub mod registry;

pub use interval::{Interval, IntervalHandle};
pub use registry::{OwnerLiveness, TimerHandle, TimerRegistry};
