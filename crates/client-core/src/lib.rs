//! # sipmesh client-core
//!
//! User-facing call and conference logic on top of pluggable collaborators.
//!
//! - [`CallController`] places, answers and controls a single call, with
//!   abortable setup and a [`DurationTracker`] for the answered call
//! - [`DtmfSequencer`] sends validated tone sequences with cancellable gaps
//! - [`ConferenceManager`] runs one multi-party conference: participants,
//!   lock, recording, audio-level polling and a delayed clear after ending
//!
//! The SIP stack and capture devices are reached through the
//! [`SignalingClient`], [`CallSession`] and [`MediaManager`] traits. The
//! [`mock`] module implements them over
//! [`MockSipServer`](sipmesh_session_core::MockSipServer) for tests.
//!
//! ```rust,no_run
//! use sipmesh_client_core::{
//!     ConferenceConfig, ConferenceManager, ConferenceOptions, MockSignalingClient, SignalingClient,
//! };
//! use sipmesh_session_core::{MockServerConfig, MockSipServer};
//! use std::sync::Arc;
//!
//! # async fn example() -> sipmesh_client_core::Result<()> {
//! let server = MockSipServer::new(MockServerConfig::default());
//! let signaling: Arc<dyn SignalingClient> =
//!     Arc::new(MockSignalingClient::new(server, "sip:alice@example.com"));
//! let manager = ConferenceManager::new(
//!     Some(signaling),
//!     ConferenceConfig::new("sip:alice@example.com"),
//! );
//! manager.create_conference(ConferenceOptions::default().with_max_participants(4)).await?;
//! manager.add_participant("bob@example.com", Some("Bob")).await?;
//! manager.end_conference().await?;
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod conference;
pub mod config;
pub mod dtmf;
pub mod errors;
pub mod media;
pub mod mock;
pub mod signaling;

pub use call::{
    normalize_target, CallController, CallState, CallStateChange, DurationTracker, BUSY_HERE,
};
pub use conference::{
    Conference, ConferenceEvent, ConferenceId, ConferenceManager, ConferenceOptions,
    ConferenceState, Participant, ParticipantChange, ParticipantId, ParticipantState,
};
pub use config::{CallSessionConfig, ConferenceConfig, DtmfConfig};
pub use dtmf::{validate_sequence, validate_tone, DtmfSequencer};
pub use errors::{ClientError, Result};
pub use media::{LocalStream, MediaConstraints, MediaManager, MediaTrack, TrackKind};
pub use mock::{
    MockCallSession, MockMediaManager, MockSignalingClient, MockTrack, SignalingOp,
    SignalingRequest,
};
pub use signaling::{
    CallOptions, CallSession, ConferenceAudioLevels, DtmfSender, SessionEventHandler,
    SignalingClient, Subscription,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
