//! # sipmesh session-core
//!
//! The call-leg model and a deterministic stand-in for a remote SIP peer.
//!
//! - [`Session`] is one call leg: progress state, hold flags, identities and
//!   the operations a call supports (answer, hold, refer, DTMF, terminate).
//! - [`MockSipServer`] simulates connect, register, incoming and outgoing
//!   calls, ringing, answer, hold and termination. Every simulated event is
//!   delayed by the configured network latency through a
//!   [`TimerRegistry`](sipmesh_infra_common::TimerRegistry), and session-scoped
//!   events are dropped once their session has ended.
//!
//! ```rust,no_run
//! use sipmesh_session_core::{MockServerConfig, MockSipServer, ServerEventKind};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSipServer::new(
//!     MockServerConfig::default().with_network_latency(Duration::from_millis(20)),
//! );
//! server.on(ServerEventKind::NewSession, |event| {
//!     println!("new session: {:?}", event);
//! });
//! let session = server.simulate_incoming_call("sip:alice@example.com", "sip:bob@example.com")?;
//! session.answer()?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod mock;
pub mod session;
pub mod uri;

pub use errors::{Result, SessionError};
pub use mock::{MockServerConfig, MockSipServer, ServerEvent, ServerEventKind};
pub use session::{
    Direction, HoldState, Identity, Originator, Session, SessionEvent, SessionEventKind, SessionId,
    SessionState,
};
pub use uri::SipUri;
