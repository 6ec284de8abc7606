//! Deterministic stand-in for a remote SIP peer

pub mod config;
pub mod events;
pub mod server;

pub use config::MockServerConfig;
pub use events::{ServerEvent, ServerEventKind};
pub use server::MockSipServer;
