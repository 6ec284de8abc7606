//! Concurrency primitives for interleaved async operations

pub mod abort;
pub mod guard;

pub use abort::{AbortController, AbortSignal};
pub use guard::{GuardPermit, OperationGuard};
