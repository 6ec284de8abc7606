//! Conference orchestration.
//!
//! A [`ConferenceManager`] runs at most one conference at a time:
//!
//! ```text
//! Idle -> Active -> Ending -> Ended -> (cleared after the settle delay)
//!   \
//!    -> Failed   (create/join rejected by the signaling layer)
//! ```
//!
//! While a conference is `Active` the manager polls per-address audio levels
//! on an [`Interval`]. Ending the conference, or calling
//! [`dispose`](ConferenceManager::dispose), stops the poller.
//!
//! No lock is held across a signaling call. Every mutation that follows an
//! await re-checks that the same conference is still current. A create, join
//! or end whose future is dropped mid-await is rolled back.

use chrono::Utc;
use parking_lot::Mutex;
use sipmesh_infra_common::{
    Interval, IntervalHandle, ListenerId, ListenerSet, OperationGuard, TimerRegistry,
};
use sipmesh_session_core::SipUri;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::events::{ConferenceEvent, ParticipantChange};
use super::types::{
    Conference, ConferenceId, ConferenceOptions, ConferenceState, Participant, ParticipantId,
};
use crate::call::normalize_target;
use crate::config::ConferenceConfig;
use crate::errors::{ClientError, Result};
use crate::signaling::SignalingClient;

struct ConferenceInner {
    signaling: Option<Arc<dyn SignalingClient>>,
    config: ConferenceConfig,
    conference: Mutex<Option<Conference>>,
    participant_guard: OperationGuard,
    listeners: ListenerSet<ConferenceEvent>,
    poller: Mutex<Option<IntervalHandle>>,
    timers: TimerRegistry,
}

/// Rolls an in-flight create/join/end back if its future is dropped before
/// the signaling layer answers.
///
/// `Idle` drops the reservation. `Ending` returns the conference to `Active`.
struct PendingTransition {
    manager: ConferenceManager,
    id: ConferenceId,
    pending: ConferenceState,
    armed: bool,
}

impl PendingTransition {
    fn new(manager: &ConferenceManager, id: &ConferenceId, pending: ConferenceState) -> Self {
        Self {
            manager: manager.clone(),
            id: id.clone(),
            pending,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingTransition {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("Conference {} {:?} transition abandoned", self.id, self.pending);
        match self.pending {
            ConferenceState::Idle => self.manager.release_reservation(&self.id),
            ConferenceState::Ending => {
                self.manager.restore_active(&self.id);
            }
            _ => {}
        }
    }
}

/// Multi-party conference orchestrator
#[derive(Clone)]
pub struct ConferenceManager {
    inner: Arc<ConferenceInner>,
}

impl ConferenceManager {
    /// Create a manager. Without a signaling client every create/join is rejected.
    pub fn new(signaling: Option<Arc<dyn SignalingClient>>, config: ConferenceConfig) -> Self {
        Self {
            inner: Arc::new(ConferenceInner {
                signaling,
                config,
                conference: Mutex::new(None),
                participant_guard: OperationGuard::new("Participant"),
                listeners: ListenerSet::new("conference-manager"),
                poller: Mutex::new(None),
                timers: TimerRegistry::new("conference-manager"),
            }),
        }
    }

    // ---- queries ----

    /// Snapshot of the current conference, `None` when there is none
    pub fn conference(&self) -> Option<Conference> {
        self.inner.conference.lock().clone()
    }

    pub fn state(&self) -> ConferenceState {
        self.inner
            .conference
            .lock()
            .as_ref()
            .map_or(ConferenceState::Idle, |c| c.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConferenceState::Active
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.inner
            .conference
            .lock()
            .as_ref()
            .map(|c| c.participants.clone())
            .unwrap_or_default()
    }

    pub fn participant_count(&self) -> usize {
        self.inner
            .conference
            .lock()
            .as_ref()
            .map_or(0, |c| c.participants.len())
    }

    pub fn get_participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.inner
            .conference
            .lock()
            .as_ref()
            .and_then(|c| c.participant(id).cloned())
    }

    pub fn is_polling_audio_levels(&self) -> bool {
        self.inner
            .poller
            .lock()
            .as_ref()
            .is_some_and(IntervalHandle::is_running)
    }

    // ---- listeners ----

    /// Receive every conference event. A panicking listener does not stop
    /// delivery to the others.
    pub fn on_conference_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConferenceEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    pub fn off_conference_event(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    fn emit(&self, event: ConferenceEvent) {
        self.inner.listeners.emit(&event);
    }

    fn emit_state(&self, conference_id: &ConferenceId, previous: ConferenceState, current: ConferenceState) {
        debug!("Conference {} state {:?} -> {:?}", conference_id, previous, current);
        self.emit(ConferenceEvent::StateChanged {
            conference_id: conference_id.clone(),
            previous,
            current,
        });
    }

    // ---- helpers ----

    fn signaling(&self) -> Result<Arc<dyn SignalingClient>> {
        self.inner
            .signaling
            .clone()
            .ok_or(ClientError::NoSignalingClient)
    }

    /// Run `f` against the current conference if it is active
    fn with_active<T>(&self, f: impl FnOnce(&mut Conference) -> Result<T>) -> Result<T> {
        let mut slot = self.inner.conference.lock();
        match slot.as_mut() {
            Some(conference) if conference.state == ConferenceState::Active => f(conference),
            _ => Err(ClientError::NoActiveConference),
        }
    }

    /// Like [`with_active`](Self::with_active) but also requires the conference to be `id`
    fn with_same<T>(&self, id: &ConferenceId, f: impl FnOnce(&mut Conference) -> Result<T>) -> Result<T> {
        self.with_active(|conference| {
            if &conference.id != id {
                return Err(ClientError::NoActiveConference);
            }
            f(conference)
        })
    }

    fn validate_options(options: &ConferenceOptions) -> Result<()> {
        match options.max_participants {
            Some(capacity) if capacity < 1 => Err(ClientError::InvalidCapacity { capacity }),
            _ => Ok(()),
        }
    }

    /// Claim the conference slot for a new record in `Idle`
    fn reserve(&self, id: &ConferenceId, uri: &str, options: &ConferenceOptions) -> Result<()> {
        {
            let mut slot = self.inner.conference.lock();
            if slot.as_ref().is_some_and(|c| c.state.is_live()) {
                return Err(ClientError::ConferenceAlreadyActive);
            }
            *slot = Some(Conference::new(id.clone(), uri.to_string(), options));
        }
        // a settle timer left by the previous conference must not clear this one
        self.inner.timers.cancel_all();
        Ok(())
    }

    fn release_reservation(&self, id: &ConferenceId) {
        let mut slot = self.inner.conference.lock();
        if slot
            .as_ref()
            .is_some_and(|c| &c.id == id && c.state == ConferenceState::Idle)
        {
            *slot = None;
        }
    }

    /// `Ending` back to `Active`; false when `id` is no longer ending
    fn restore_active(&self, id: &ConferenceId) -> bool {
        let restored = {
            let mut slot = self.inner.conference.lock();
            match slot
                .as_mut()
                .filter(|c| &c.id == id && c.state == ConferenceState::Ending)
            {
                Some(conference) => {
                    conference.state = ConferenceState::Active;
                    true
                }
                None => false,
            }
        };
        if restored {
            self.emit_state(id, ConferenceState::Ending, ConferenceState::Active);
        }
        restored
    }

    /// Complete create/join: `Active` with the local participant on success, `Failed` otherwise
    fn complete_setup(&self, id: &ConferenceId, outcome: Result<()>, announce: ConferenceEvent) -> Result<()> {
        if let Err(err) = outcome {
            let failed = {
                let mut slot = self.inner.conference.lock();
                match slot.as_mut().filter(|c| &c.id == id) {
                    Some(conference) => {
                        conference.state = ConferenceState::Failed;
                        conference.ended_at = Some(Utc::now());
                        true
                    }
                    None => false,
                }
            };
            warn!("Conference {} setup failed: {}", id, err);
            if failed {
                self.emit_state(id, ConferenceState::Idle, ConferenceState::Failed);
            }
            return Err(err);
        }

        {
            let mut slot = self.inner.conference.lock();
            let conference = slot
                .as_mut()
                .filter(|c| &c.id == id && c.state == ConferenceState::Idle)
                .ok_or(ClientError::NoActiveConference)?;
            let local = Participant::local(
                self.inner.config.local_uri.clone(),
                self.inner.config.local_display_name.clone(),
            );
            conference.participants.insert(0, local);
            conference.state = ConferenceState::Active;
            conference.started_at = Some(Utc::now());
        }

        self.start_polling();
        self.emit_state(id, ConferenceState::Idle, ConferenceState::Active);
        self.emit(announce);
        Ok(())
    }

    // ---- lifecycle ----

    /// Host a new conference; the local user joins as moderator
    pub async fn create_conference(&self, options: ConferenceOptions) -> Result<ConferenceId> {
        let signaling = self.signaling()?;
        Self::validate_options(&options)?;
        let mut address = SipUri::parse(&self.inner.config.local_uri)?;

        let id = ConferenceId::new();
        // conference lives on the local user's domain
        address.user = id.to_string();
        let uri = address.to_string();
        self.reserve(&id, &uri, &options)?;
        info!("Creating conference {} at {}", id, uri);

        let pending = PendingTransition::new(self, &id, ConferenceState::Idle);
        let outcome = signaling.create_conference(id.as_str(), &options).await;
        pending.disarm();
        self.complete_setup(
            &id,
            outcome,
            ConferenceEvent::Created {
                conference_id: id.clone(),
                uri,
            },
        )?;
        Ok(id)
    }

    /// Join an existing conference by address
    pub async fn join_conference(&self, uri: &str, options: ConferenceOptions) -> Result<ConferenceId> {
        let signaling = self.signaling()?;
        let uri = normalize_target(uri)?;
        Self::validate_options(&options)?;

        let id = ConferenceId::new();
        self.reserve(&id, &uri, &options)?;
        info!("Joining conference {} as {}", uri, id);

        let pending = PendingTransition::new(self, &id, ConferenceState::Idle);
        let outcome = signaling.join_conference(&uri, &options).await;
        pending.disarm();
        self.complete_setup(
            &id,
            outcome,
            ConferenceEvent::Joined {
                conference_id: id.clone(),
                uri,
            },
        )?;
        Ok(id)
    }

    /// End the active conference. If the signaling layer refuses, the
    /// conference goes back to `Active` and the error is returned.
    pub async fn end_conference(&self) -> Result<()> {
        let signaling = self.signaling()?;
        let id = {
            let mut slot = self.inner.conference.lock();
            let conference = slot
                .as_mut()
                .filter(|c| c.state == ConferenceState::Active)
                .ok_or(ClientError::NoActiveConference)?;
            conference.state = ConferenceState::Ending;
            conference.id.clone()
        };
        self.emit_state(&id, ConferenceState::Active, ConferenceState::Ending);

        let pending = PendingTransition::new(self, &id, ConferenceState::Ending);
        let outcome = signaling.end_conference(id.as_str()).await;
        pending.disarm();
        if let Err(err) = outcome {
            warn!("Ending conference {} failed: {}", id, err);
            self.restore_active(&id);
            return Err(err);
        }

        if let Some(conference) = self.inner.conference.lock().as_mut().filter(|c| c.id == id) {
            conference.state = ConferenceState::Ended;
            conference.ended_at = Some(Utc::now());
        }
        self.emit_state(&id, ConferenceState::Ending, ConferenceState::Ended);
        self.stop_polling();
        self.emit(ConferenceEvent::Ended {
            conference_id: id.clone(),
        });
        info!("Conference {} ended", id);

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timers
            .schedule(self.inner.config.settle_delay, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut slot = inner.conference.lock();
                if slot
                    .as_ref()
                    .is_some_and(|c| c.id == id && c.state == ConferenceState::Ended)
                {
                    *slot = None;
                    debug!("Conference {} cleared", id);
                }
            });
        Ok(())
    }

    /// Tear the manager down: stop polling and drop the pending settle timer
    pub fn dispose(&self) {
        self.stop_polling();
        let cancelled = self.inner.timers.cancel_all();
        debug!("Conference manager disposed ({} timer(s) cancelled)", cancelled);
    }

    // ---- participants ----

    /// Invite `uri`. Overlapping adds are rejected, not queued.
    pub async fn add_participant(&self, uri: &str, display_name: Option<&str>) -> Result<ParticipantId> {
        let uri = normalize_target(uri)?;
        let _permit = self.inner.participant_guard.try_acquire()?;

        let conference_id = self.with_active(|conference| {
            if conference.is_locked {
                return Err(ClientError::ConferenceLocked);
            }
            if conference.is_full() {
                return Err(ClientError::ConferenceFull);
            }
            Ok(conference.id.clone())
        })?;

        self.signaling()?
            .invite_to_conference(conference_id.as_str(), &uri)
            .await?;

        let participant = Participant::new(uri, display_name.map(str::to_string));
        self.with_same(&conference_id, |conference| {
            if conference.is_full() {
                return Err(ClientError::ConferenceFull);
            }
            conference.participants.push(participant.clone());
            Ok(())
        })?;

        info!("Participant {} ({}) joined {}", participant.id, participant.uri, conference_id);
        let id = participant.id.clone();
        self.emit(ConferenceEvent::ParticipantJoined {
            conference_id,
            participant,
        });
        Ok(id)
    }

    /// Remove a remote participant. The local participant leaves only
    /// through [`end_conference`](Self::end_conference).
    pub async fn remove_participant(&self, id: &ParticipantId, reason: Option<&str>) -> Result<()> {
        let (conference_id, uri) = self.with_active(|conference| {
            let participant = conference
                .participant(id)
                .ok_or_else(|| ClientError::participant_not_found(id.as_str()))?;
            if participant.is_self {
                return Err(ClientError::CannotRemoveSelf);
            }
            Ok((conference.id.clone(), participant.uri.clone()))
        })?;

        self.signaling()?
            .remove_from_conference(conference_id.as_str(), &uri)
            .await?;

        let participant = self.with_same(&conference_id, |conference| {
            let index = conference
                .participants
                .iter()
                .position(|p| &p.id == id)
                .ok_or_else(|| ClientError::participant_not_found(id.as_str()))?;
            Ok(conference.participants.remove(index))
        })?;

        info!("Participant {} left {}", participant.id, conference_id);
        self.emit(ConferenceEvent::ParticipantLeft {
            conference_id,
            participant,
            reason: reason.map(str::to_string),
        });
        Ok(())
    }

    pub async fn mute_participant(&self, id: &ParticipantId) -> Result<()> {
        self.set_participant_muted(id, true).await
    }

    pub async fn unmute_participant(&self, id: &ParticipantId) -> Result<()> {
        self.set_participant_muted(id, false).await
    }

    async fn set_participant_muted(&self, id: &ParticipantId, muted: bool) -> Result<()> {
        let (conference_id, uri, is_self, current) = self.with_active(|conference| {
            let participant = conference
                .participant(id)
                .ok_or_else(|| ClientError::participant_not_found(id.as_str()))?;
            Ok((
                conference.id.clone(),
                participant.uri.clone(),
                participant.is_self,
                participant.is_muted,
            ))
        })?;
        if current == muted {
            debug!("Participant {} already {}", id, if muted { "muted" } else { "unmuted" });
            return Ok(());
        }

        let signaling = self.signaling()?;
        match (is_self, muted) {
            (true, true) => signaling.mute_audio().await?,
            (true, false) => signaling.unmute_audio().await?,
            (false, true) => signaling.mute_participant(conference_id.as_str(), &uri).await?,
            (false, false) => signaling.unmute_participant(conference_id.as_str(), &uri).await?,
        }

        let participant = self.with_same(&conference_id, |conference| {
            let participant = conference
                .participant_mut(id)
                .ok_or_else(|| ClientError::participant_not_found(id.as_str()))?;
            participant.is_muted = muted;
            Ok(participant.clone())
        })?;
        self.emit(ConferenceEvent::ParticipantUpdated {
            conference_id,
            participant,
            change: ParticipantChange::Muted(muted),
        });
        Ok(())
    }

    // ---- conference flags ----

    pub fn lock_conference(&self) -> Result<()> {
        self.set_locked(true)
    }

    pub fn unlock_conference(&self) -> Result<()> {
        self.set_locked(false)
    }

    fn set_locked(&self, locked: bool) -> Result<()> {
        let changed = self.with_active(|conference| {
            if conference.is_locked == locked {
                return Ok(None);
            }
            conference.is_locked = locked;
            Ok(Some(conference.id.clone()))
        })?;
        match changed {
            Some(conference_id) if locked => self.emit(ConferenceEvent::Locked { conference_id }),
            Some(conference_id) => self.emit(ConferenceEvent::Unlocked { conference_id }),
            None => debug!("Conference lock already {}", locked),
        }
        Ok(())
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.set_recording(true).await
    }

    pub async fn stop_recording(&self) -> Result<()> {
        self.set_recording(false).await
    }

    async fn set_recording(&self, recording: bool) -> Result<()> {
        let (conference_id, current) =
            self.with_active(|conference| Ok((conference.id.clone(), conference.is_recording)))?;
        if current == recording {
            debug!("Conference {} recording already {}", conference_id, recording);
            return Ok(());
        }

        let signaling = self.signaling()?;
        if recording {
            signaling.start_conference_recording(conference_id.as_str()).await?;
        } else {
            signaling.stop_conference_recording(conference_id.as_str()).await?;
        }

        let changed = self.with_same(&conference_id, |conference| {
            let changed = conference.is_recording != recording;
            conference.is_recording = recording;
            Ok(changed)
        })?;
        if changed {
            self.emit(if recording {
                ConferenceEvent::RecordingStarted { conference_id }
            } else {
                ConferenceEvent::RecordingStopped { conference_id }
            });
        }
        Ok(())
    }

    // ---- audio levels ----

    fn start_polling(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handle = Interval::start(
            "conference-audio-levels",
            self.inner.config.audio_poll_interval,
            move || {
                if let Some(inner) = weak.upgrade() {
                    ConferenceManager { inner }.poll_audio_levels();
                }
            },
        );
        if let Some(mut previous) = self.inner.poller.lock().replace(handle) {
            previous.stop();
        }
    }

    fn stop_polling(&self) {
        if let Some(mut poller) = self.inner.poller.lock().take() {
            poller.stop();
            debug!("Audio level polling stopped");
        }
    }

    /// One poll: copy reported levels onto matching participants
    fn poll_audio_levels(&self) {
        let Some(signaling) = &self.inner.signaling else {
            return;
        };
        let Some(source) = signaling.audio_levels() else {
            trace!("Signaling client does not report audio levels");
            return;
        };
        let Some(levels) = source.conference_audio_levels() else {
            trace!("No audio levels reported");
            return;
        };

        let conference_id = {
            let mut slot = self.inner.conference.lock();
            let Some(conference) = slot
                .as_mut()
                .filter(|c| c.state == ConferenceState::Active)
            else {
                return;
            };
            for participant in conference.participants.iter_mut() {
                if let Some(level) = levels.get(&participant.uri) {
                    participant.audio_level = Some(*level);
                }
            }
            conference.id.clone()
        };
        self.emit(ConferenceEvent::AudioLevel {
            conference_id,
            levels,
        });
    }
}
