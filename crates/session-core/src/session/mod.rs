//! Call-leg state and operations

pub mod entity;
pub mod events;
pub mod types;

pub use entity::Session;
pub use events::{SessionEvent, SessionEventKind};
pub use types::{Direction, HoldState, Identity, Originator, SessionId, SessionState};
