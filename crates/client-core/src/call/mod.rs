//! Single-call control: placing, answering, in-call operations and duration

pub mod controller;
pub mod duration;
pub mod types;

pub use controller::{normalize_target, CallController, BUSY_HERE};
pub use duration::DurationTracker;
pub use types::{CallState, CallStateChange};
