//! Signaling collaborator interfaces.
//!
//! The SIP stack itself lives outside this crate. Call control and the
//! conference manager talk to it through [`SignalingClient`] and the
//! per-call [`CallSession`]. Capabilities some stacks lack are exposed as
//! accessors returning `Option`: [`SignalingClient::audio_levels`] and
//! [`CallSession::dtmf_sender`]. Callers check them before use and treat
//! `None` as "not supported", never as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sipmesh_session_core::SessionEvent;
use std::collections::HashMap;
use std::sync::Arc;

use crate::conference::ConferenceOptions;
use crate::errors::Result;

/// Options for placing or answering a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    pub audio: bool,
    pub video: bool,
    /// Extra SIP headers to send with the request
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
            extra_headers: Vec::new(),
        }
    }
}

impl CallOptions {
    pub fn with_video(mut self, video: bool) -> Self {
        self.video = video;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// Handler receiving a call's signaling events
pub type SessionEventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Registration returned by [`CallSession::subscribe`]; dropping it keeps the
/// handler installed, [`cancel`](Subscription::cancel) removes it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Sends in-band or SIP INFO DTMF on a call
#[async_trait]
pub trait DtmfSender: Send + Sync {
    async fn send_tone(&self, tone: char) -> Result<()>;
}

/// Per-address audio levels of the current conference
pub trait ConferenceAudioLevels: Send + Sync {
    /// `None` when the stack has no measurement to report right now
    fn conference_audio_levels(&self) -> Option<HashMap<String, f32>>;
}

/// One call leg as seen by the signaling stack
#[async_trait]
pub trait CallSession: Send + Sync {
    fn id(&self) -> String;

    fn remote_uri(&self) -> String;

    async fn answer(&self, options: &CallOptions) -> Result<()>;
    async fn terminate(&self) -> Result<()>;
    async fn reject(&self, status_code: u16) -> Result<()>;
    async fn hold(&self) -> Result<()>;
    async fn unhold(&self) -> Result<()>;
    async fn mute(&self) -> Result<()>;
    async fn unmute(&self) -> Result<()>;
    async fn refer(&self, target: &str) -> Result<()>;

    /// DTMF capability, if the transport has one
    fn dtmf_sender(&self) -> Option<&dyn DtmfSender> {
        None
    }

    /// Receive this call's signaling events until the subscription is cancelled
    fn subscribe(&self, handler: SessionEventHandler) -> Subscription;
}

/// The SIP user agent
#[async_trait]
pub trait SignalingClient: Send + Sync {
    async fn call(&self, target: &str, options: &CallOptions) -> Result<Arc<dyn CallSession>>;
    async fn register(&self) -> Result<()>;

    async fn create_conference(&self, conference_id: &str, options: &ConferenceOptions) -> Result<()>;
    async fn join_conference(&self, uri: &str, options: &ConferenceOptions) -> Result<()>;
    async fn end_conference(&self, conference_id: &str) -> Result<()>;
    async fn invite_to_conference(&self, conference_id: &str, uri: &str) -> Result<()>;
    async fn remove_from_conference(&self, conference_id: &str, uri: &str) -> Result<()>;

    /// Mute the local microphone
    async fn mute_audio(&self) -> Result<()>;
    async fn unmute_audio(&self) -> Result<()>;
    async fn mute_participant(&self, conference_id: &str, uri: &str) -> Result<()>;
    async fn unmute_participant(&self, conference_id: &str, uri: &str) -> Result<()>;

    async fn start_conference_recording(&self, conference_id: &str) -> Result<()>;
    async fn stop_conference_recording(&self, conference_id: &str) -> Result<()>;

    /// Audio-level capability; older stacks return `None`
    fn audio_levels(&self) -> Option<&dyn ConferenceAudioLevels> {
        None
    }
}
