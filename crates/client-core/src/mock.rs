//! In-process collaborators backed by [`MockSipServer`].
//!
//! [`MockSignalingClient`] records every request it receives, waits one
//! network-latency period per request, and can be told to fail the next
//! request of a given kind. [`MockMediaManager`] hands out tracks whose
//! stopped state tests can inspect.

use async_trait::async_trait;
use parking_lot::Mutex;
use sipmesh_session_core::{MockSipServer, Session, SessionEvent, SessionEventKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::conference::ConferenceOptions;
use crate::errors::{ClientError, Result};
use crate::media::{LocalStream, MediaConstraints, MediaManager, MediaTrack, TrackKind};
use crate::signaling::{
    CallOptions, CallSession, ConferenceAudioLevels, DtmfSender, SessionEventHandler,
    SignalingClient, Subscription,
};

/// Kinds of request a [`SignalingClient`] receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingOp {
    Call,
    Register,
    CreateConference,
    JoinConference,
    EndConference,
    InviteToConference,
    RemoveFromConference,
    MuteAudio,
    UnmuteAudio,
    MuteParticipant,
    UnmuteParticipant,
    StartRecording,
    StopRecording,
}

impl fmt::Display for SignalingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One request seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingRequest {
    pub op: SignalingOp,
    /// Conference id and/or address the request was about
    pub args: Vec<String>,
}

/// Signaling client simulated on top of a [`MockSipServer`]
pub struct MockSignalingClient {
    server: MockSipServer,
    local_uri: String,
    requests: Mutex<Vec<SignalingRequest>>,
    failures: Mutex<HashMap<SignalingOp, usize>>,
    audio_levels: Mutex<Option<HashMap<String, f32>>>,
    reports_audio_levels: bool,
    dtmf: bool,
}

impl MockSignalingClient {
    pub fn new(server: MockSipServer, local_uri: impl Into<String>) -> Self {
        Self {
            server,
            local_uri: local_uri.into(),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            audio_levels: Mutex::new(None),
            reports_audio_levels: true,
            dtmf: true,
        }
    }

    /// Behave like a stack with no audio-level API
    pub fn without_audio_levels(mut self) -> Self {
        self.reports_audio_levels = false;
        self
    }

    /// Calls placed through this client have no DTMF sender
    pub fn without_dtmf(mut self) -> Self {
        self.dtmf = false;
        self
    }

    pub fn server(&self) -> &MockSipServer {
        &self.server
    }

    /// Fail the next `op` request with a signaling error
    pub fn fail_next(&self, op: SignalingOp) {
        *self.failures.lock().entry(op).or_default() += 1;
    }

    /// Levels returned by the next polls; `None` reports nothing
    pub fn set_audio_levels(&self, levels: Option<HashMap<String, f32>>) {
        *self.audio_levels.lock() = levels;
    }

    pub fn requests(&self) -> Vec<SignalingRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, op: SignalingOp) -> usize {
        self.requests.lock().iter().filter(|r| r.op == op).count()
    }

    async fn perform(&self, op: SignalingOp, args: &[&str]) -> Result<()> {
        self.requests.lock().push(SignalingRequest {
            op,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        tokio::time::sleep(self.server.network_latency()).await;

        let fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&op) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            debug!("Mock signaling failing {} by request", op);
            return Err(ClientError::signaling(format!("Simulated {} failure", op)));
        }
        Ok(())
    }
}

impl ConferenceAudioLevels for MockSignalingClient {
    fn conference_audio_levels(&self) -> Option<HashMap<String, f32>> {
        self.audio_levels.lock().clone()
    }
}

#[async_trait]
impl SignalingClient for MockSignalingClient {
    async fn call(&self, target: &str, _options: &CallOptions) -> Result<Arc<dyn CallSession>> {
        self.perform(SignalingOp::Call, &[target]).await?;
        let session = self.server.simulate_outgoing_call(&self.local_uri, target)?;
        let call = MockCallSession::new(session);
        Ok(Arc::new(if self.dtmf { call } else { call.without_dtmf() }))
    }

    async fn register(&self) -> Result<()> {
        self.perform(SignalingOp::Register, &[&self.local_uri]).await?;
        self.server.register()?;
        Ok(())
    }

    async fn create_conference(&self, conference_id: &str, _options: &ConferenceOptions) -> Result<()> {
        self.perform(SignalingOp::CreateConference, &[conference_id]).await
    }

    async fn join_conference(&self, uri: &str, _options: &ConferenceOptions) -> Result<()> {
        self.perform(SignalingOp::JoinConference, &[uri]).await
    }

    async fn end_conference(&self, conference_id: &str) -> Result<()> {
        self.perform(SignalingOp::EndConference, &[conference_id]).await
    }

    async fn invite_to_conference(&self, conference_id: &str, uri: &str) -> Result<()> {
        self.perform(SignalingOp::InviteToConference, &[conference_id, uri]).await
    }

    async fn remove_from_conference(&self, conference_id: &str, uri: &str) -> Result<()> {
        self.perform(SignalingOp::RemoveFromConference, &[conference_id, uri]).await
    }

    async fn mute_audio(&self) -> Result<()> {
        self.perform(SignalingOp::MuteAudio, &[]).await
    }

    async fn unmute_audio(&self) -> Result<()> {
        self.perform(SignalingOp::UnmuteAudio, &[]).await
    }

    async fn mute_participant(&self, conference_id: &str, uri: &str) -> Result<()> {
        self.perform(SignalingOp::MuteParticipant, &[conference_id, uri]).await
    }

    async fn unmute_participant(&self, conference_id: &str, uri: &str) -> Result<()> {
        self.perform(SignalingOp::UnmuteParticipant, &[conference_id, uri]).await
    }

    async fn start_conference_recording(&self, conference_id: &str) -> Result<()> {
        self.perform(SignalingOp::StartRecording, &[conference_id]).await
    }

    async fn stop_conference_recording(&self, conference_id: &str) -> Result<()> {
        self.perform(SignalingOp::StopRecording, &[conference_id]).await
    }

    fn audio_levels(&self) -> Option<&dyn ConferenceAudioLevels> {
        if self.reports_audio_levels {
            Some(self)
        } else {
            None
        }
    }
}

/// [`CallSession`] over a mock [`Session`]
pub struct MockCallSession {
    session: Arc<Session>,
    dtmf: bool,
}

impl MockCallSession {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session, dtmf: true }
    }

    pub fn without_dtmf(mut self) -> Self {
        self.dtmf = false;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

const ALL_KINDS: [SessionEventKind; 9] = [
    SessionEventKind::Progress,
    SessionEventKind::Accepted,
    SessionEventKind::Confirmed,
    SessionEventKind::Hold,
    SessionEventKind::Unhold,
    SessionEventKind::Refer,
    SessionEventKind::NewDtmf,
    SessionEventKind::Failed,
    SessionEventKind::Ended,
];

#[async_trait]
impl DtmfSender for MockCallSession {
    async fn send_tone(&self, tone: char) -> Result<()> {
        Ok(self.session.send_dtmf(tone)?)
    }
}

#[async_trait]
impl CallSession for MockCallSession {
    fn id(&self) -> String {
        self.session.id().to_string()
    }

    fn remote_uri(&self) -> String {
        self.session.remote_identity().uri.to_string()
    }

    async fn answer(&self, _options: &CallOptions) -> Result<()> {
        Ok(self.session.answer()?)
    }

    async fn terminate(&self) -> Result<()> {
        Ok(self.session.terminate()?)
    }

    async fn reject(&self, status_code: u16) -> Result<()> {
        Ok(self.session.reject(status_code)?)
    }

    async fn hold(&self) -> Result<()> {
        Ok(self.session.hold()?)
    }

    async fn unhold(&self) -> Result<()> {
        Ok(self.session.unhold()?)
    }

    async fn mute(&self) -> Result<()> {
        Ok(self.session.mute()?)
    }

    async fn unmute(&self) -> Result<()> {
        Ok(self.session.unmute()?)
    }

    async fn refer(&self, target: &str) -> Result<()> {
        Ok(self.session.refer(target)?)
    }

    fn dtmf_sender(&self) -> Option<&dyn DtmfSender> {
        if self.dtmf {
            Some(self)
        } else {
            None
        }
    }

    fn subscribe(&self, handler: SessionEventHandler) -> Subscription {
        let ids: Vec<_> = ALL_KINDS
            .iter()
            .map(|kind| {
                let handler = handler.clone();
                (*kind, self.session.on(*kind, move |event: &SessionEvent| handler(event)))
            })
            .collect();
        let session: Weak<Session> = Arc::downgrade(&self.session);
        Subscription::new(move || {
            if let Some(session) = session.upgrade() {
                for (kind, id) in ids {
                    session.off(kind, id);
                }
            }
        })
    }
}

/// Capture track handed out by [`MockMediaManager`]
#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: TrackKind,
    stopped: AtomicBool,
}

impl MediaTrack for MockTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Media manager producing [`MockTrack`]s
#[derive(Default)]
pub struct MockMediaManager {
    delay: Duration,
    fail_next: AtomicBool,
    acquisitions: AtomicUsize,
    tracks: Mutex<Vec<Arc<MockTrack>>>,
    stream: Mutex<Option<LocalStream>>,
}

impl MockMediaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time to open devices
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the next acquisition fail, as if permission was denied
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Every track ever handed out
    pub fn tracks(&self) -> Vec<Arc<MockTrack>> {
        self.tracks.lock().clone()
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.lock().iter().filter(|t| !t.is_stopped()).count()
    }
}

#[async_trait]
impl MediaManager for MockMediaManager {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClientError::media("Permission denied"));
        }
        let n = self.acquisitions.fetch_add(1, Ordering::SeqCst);

        let mut kinds = Vec::new();
        if constraints.audio {
            kinds.push(TrackKind::Audio);
        }
        if constraints.video {
            kinds.push(TrackKind::Video);
        }
        let tracks: Vec<Arc<MockTrack>> = kinds
            .into_iter()
            .map(|kind| {
                Arc::new(MockTrack {
                    id: format!("{:?}-{}", kind, n).to_lowercase(),
                    kind,
                    stopped: AtomicBool::new(false),
                })
            })
            .collect();

        self.tracks.lock().extend(tracks.iter().cloned());
        *self.stream.lock() = Some(LocalStream::new(
            tracks
                .into_iter()
                .map(|t| t as Arc<dyn MediaTrack>)
                .collect(),
        ));
        Ok(())
    }

    fn local_stream(&self) -> Option<LocalStream> {
        self.stream.lock().clone()
    }
}
