//! Session-level call control.
//!
//! [`CallController`] owns at most one call at a time. Placing and answering
//! are guarded by one [`OperationGuard`], so a second `make_call` or
//! `answer` arriving while the first is still suspended is rejected at once.
//! Hangup has a guard of its own.
//! Local media acquired for a call that then fails or is aborted is always
//! stopped before the error reaches the caller.

use parking_lot::Mutex;
use sipmesh_infra_common::sync::abort;
use sipmesh_infra_common::{AbortSignal, ListenerId, ListenerSet, OperationGuard};
use sipmesh_session_core::{Originator, SessionEvent, SipUri};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::duration::DurationTracker;
use super::types::{CallState, CallStateChange};
use crate::config::CallSessionConfig;
use crate::dtmf;
use crate::errors::{ClientError, Result};
use crate::media::{MediaConstraints, MediaManager};
use crate::signaling::{CallOptions, CallSession, SignalingClient, Subscription};

const OPERATION: &str = "Call";
const HANGUP: &str = "Hangup";

/// `486 Busy Here`, the usual status for declining an incoming call
pub const BUSY_HERE: u16 = 486;

/// Check a dial target and return it as a full SIP URI.
///
/// `alice@example.com` is accepted and becomes `sip:alice@example.com`.
pub fn normalize_target(target: &str) -> Result<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ClientError::EmptyTarget);
    }
    let candidate = if target.starts_with("sip:") || target.starts_with("sips:") {
        target.to_string()
    } else {
        format!("sip:{}", target)
    };
    SipUri::parse(&candidate)
        .map(|uri| uri.to_string())
        .map_err(|_| ClientError::invalid_target(target))
}

#[derive(Default)]
struct CallSlot {
    session: Option<Arc<dyn CallSession>>,
    subscription: Option<Subscription>,
    state: CallState,
    local_hold: bool,
    remote_hold: bool,
    muted: bool,
    answered_at: Option<Instant>,
}

struct CallInner {
    signaling: Arc<dyn SignalingClient>,
    media: Option<Arc<dyn MediaManager>>,
    guard: OperationGuard,
    hangup_guard: OperationGuard,
    slot: Mutex<CallSlot>,
    listeners: ListenerSet<CallStateChange>,
    duration: DurationTracker,
}

/// Controller for a single call
#[derive(Clone)]
pub struct CallController {
    inner: Arc<CallInner>,
}

impl CallController {
    pub fn new(
        signaling: Arc<dyn SignalingClient>,
        media: Option<Arc<dyn MediaManager>>,
        config: CallSessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CallInner {
                signaling,
                media,
                guard: OperationGuard::new(OPERATION),
                hangup_guard: OperationGuard::new(HANGUP),
                slot: Mutex::new(CallSlot::default()),
                listeners: ListenerSet::new("call-controller"),
                duration: DurationTracker::new(config.duration_tick),
            }),
        }
    }

    pub fn state(&self) -> CallState {
        self.inner.slot.lock().state
    }

    pub fn session(&self) -> Option<Arc<dyn CallSession>> {
        self.inner.slot.lock().session.clone()
    }

    /// Whether the local side has put the call on hold
    pub fn is_on_hold(&self) -> bool {
        self.inner.slot.lock().local_hold
    }

    pub fn is_remote_hold(&self) -> bool {
        self.inner.slot.lock().remote_hold
    }

    pub fn is_muted(&self) -> bool {
        self.inner.slot.lock().muted
    }

    /// Whether a make_call or answer is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.guard.is_busy()
    }

    pub fn duration_secs(&self) -> u64 {
        self.inner.duration.elapsed_secs()
    }

    pub fn duration(&self) -> &DurationTracker {
        &self.inner.duration
    }

    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CallStateChange) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(listener)
    }

    pub fn off_state_change(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    fn current_session(&self, operation: &str) -> Result<Arc<dyn CallSession>> {
        self.session()
            .ok_or_else(|| ClientError::no_active_session(operation))
    }

    fn ensure_idle(&self) -> Result<()> {
        let slot = self.inner.slot.lock();
        if slot.session.is_some() && !slot.state.is_terminal() {
            return Err(ClientError::CallAlreadyActive);
        }
        Ok(())
    }

    // ---- placing and answering ----

    /// Dial `target`. Local media is acquired first (when a media manager is
    /// configured); on any failure or abort after that it is released.
    pub async fn make_call(
        &self,
        target: &str,
        options: &CallOptions,
        signal: Option<&AbortSignal>,
    ) -> Result<Arc<dyn CallSession>> {
        let target = normalize_target(target)?;
        let _permit = self.inner.guard.try_acquire()?;
        self.ensure_idle()?;

        self.inner.duration.reset();
        self.apply_state(CallState::Calling);
        info!("Calling {}", target);

        match self.place_call(&target, options, signal).await {
            Ok(session) => {
                self.attach(session.clone(), CallState::Calling);
                Ok(session)
            }
            Err(err) => {
                self.release_media();
                if err.is_aborted() {
                    info!("Call to {} aborted", target);
                    self.apply_state(CallState::Idle);
                } else {
                    warn!("Call to {} failed: {}", target, err);
                    self.apply_state(CallState::Failed);
                }
                Err(err)
            }
        }
    }

    async fn place_call(
        &self,
        target: &str,
        options: &CallOptions,
        signal: Option<&AbortSignal>,
    ) -> Result<Arc<dyn CallSession>> {
        abort::check(signal, OPERATION)?;
        self.acquire_media(options, signal).await?;
        abort::check(signal, OPERATION)?;

        let session =
            abort::race(signal, OPERATION, self.inner.signaling.call(target, options)).await??;

        if let Err(err) = abort::check(signal, OPERATION) {
            // the request went out before the abort; hang it up again
            if let Err(hangup) = session.terminate().await {
                warn!("Failed to hang up aborted call {}: {}", session.id(), hangup);
            }
            return Err(err.into());
        }
        Ok(session)
    }

    /// Answer the incoming call attached with [`attach_incoming`](Self::attach_incoming)
    pub async fn answer(&self, options: &CallOptions, signal: Option<&AbortSignal>) -> Result<()> {
        let session = self.current_session("answer")?;
        let _permit = self.inner.guard.try_acquire()?;

        if let Err(err) = self.accept_call(session.as_ref(), options, signal).await {
            self.release_media();
            warn!("Answering {} failed: {}", session.id(), err);
            return Err(err);
        }
        Ok(())
    }

    async fn accept_call(
        &self,
        session: &dyn CallSession,
        options: &CallOptions,
        signal: Option<&AbortSignal>,
    ) -> Result<()> {
        abort::check(signal, OPERATION)?;
        self.acquire_media(options, signal).await?;
        abort::check(signal, OPERATION)?;
        abort::race(signal, OPERATION, session.answer(options)).await??;
        Ok(())
    }

    async fn acquire_media(&self, options: &CallOptions, signal: Option<&AbortSignal>) -> Result<()> {
        let Some(media) = &self.inner.media else {
            return Ok(());
        };
        let constraints = MediaConstraints {
            audio: options.audio,
            video: options.video,
        };
        abort::race(signal, OPERATION, media.get_user_media(constraints)).await??;
        debug!("Local media acquired");
        Ok(())
    }

    fn release_media(&self) {
        let Some(media) = &self.inner.media else {
            return;
        };
        if let Some(stream) = media.local_stream() {
            let stopped = stream.stop_all();
            debug!("Released {} local track(s)", stopped);
        }
    }

    /// Take charge of a ringing incoming call
    pub fn attach_incoming(&self, session: Arc<dyn CallSession>) -> Result<()> {
        self.ensure_idle()?;
        info!("Incoming call {} from {}", session.id(), session.remote_uri());
        self.attach(session, CallState::Ringing);
        Ok(())
    }

    fn attach(&self, session: Arc<dyn CallSession>, state: CallState) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = session.subscribe(Arc::new(move |event: &SessionEvent| {
            if let Some(inner) = weak.upgrade() {
                CallController { inner }.handle_session_event(event);
            }
        }));
        let previous = {
            let mut slot = self.inner.slot.lock();
            slot.session = Some(session);
            slot.local_hold = false;
            slot.remote_hold = false;
            slot.muted = false;
            slot.answered_at = None;
            slot.subscription.replace(subscription)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        self.apply_state(state);
    }

    // ---- in-call operations ----

    pub async fn hangup(&self) -> Result<()> {
        let session = self.current_session("hangup")?;
        let _permit = self.inner.hangup_guard.try_acquire()?;
        session.terminate().await
    }

    /// Decline the ringing call, usually with [`BUSY_HERE`]
    pub async fn reject(&self, status_code: u16) -> Result<()> {
        self.current_session("reject")?.reject(status_code).await
    }

    pub async fn hold(&self) -> Result<()> {
        self.current_session("hold")?.hold().await
    }

    pub async fn unhold(&self) -> Result<()> {
        self.current_session("unhold")?.unhold().await
    }

    pub async fn toggle_hold(&self) -> Result<()> {
        if self.is_on_hold() {
            self.unhold().await
        } else {
            self.hold().await
        }
    }

    pub async fn mute(&self) -> Result<()> {
        self.current_session("mute")?.mute().await?;
        self.inner.slot.lock().muted = true;
        Ok(())
    }

    pub async fn unmute(&self) -> Result<()> {
        self.current_session("unmute")?.unmute().await?;
        self.inner.slot.lock().muted = false;
        Ok(())
    }

    pub async fn toggle_mute(&self) -> Result<()> {
        if self.is_muted() {
            self.unmute().await
        } else {
            self.mute().await
        }
    }

    /// Blind transfer
    pub async fn transfer(&self, target: &str) -> Result<()> {
        let session = self.current_session("transfer")?;
        let target = normalize_target(target)?;
        session.refer(&target).await
    }

    /// Send one DTMF tone. A transport without DTMF support drops it silently.
    pub async fn send_dtmf(&self, tone: char) -> Result<()> {
        let session = self.current_session("send DTMF")?;
        let tone = dtmf::validate_tone(tone)?;
        dtmf::send_validated(session.as_ref(), tone).await?;
        Ok(())
    }

    // ---- signaling events ----

    /// Fold one signaling event into the call state
    pub fn handle_session_event(&self, event: &SessionEvent) {
        let next = {
            let mut slot = self.inner.slot.lock();
            let current = slot.state;
            match event {
                SessionEvent::Progress => (current == CallState::Calling).then_some(CallState::Ringing),
                SessionEvent::Accepted | SessionEvent::Confirmed => {
                    if slot.answered_at.is_none() {
                        slot.answered_at = Some(Instant::now());
                    }
                    (!current.is_connected()).then_some(CallState::Active)
                }
                SessionEvent::Hold { originator } => {
                    match originator {
                        Originator::Local => slot.local_hold = true,
                        _ => slot.remote_hold = true,
                    }
                    Some(CallState::Held)
                }
                SessionEvent::Unhold { originator } => {
                    match originator {
                        Originator::Local => slot.local_hold = false,
                        _ => slot.remote_hold = false,
                    }
                    (!slot.local_hold && !slot.remote_hold).then_some(CallState::Active)
                }
                SessionEvent::Ended { cause, .. } => {
                    info!("Call ended: {}", cause);
                    Some(CallState::Ended)
                }
                SessionEvent::Failed { cause, .. } => {
                    warn!("Call failed: {}", cause);
                    Some(CallState::Failed)
                }
                SessionEvent::Refer { target } => {
                    info!("Call referred to {}", target);
                    None
                }
                SessionEvent::NewDtmf { tone, originator } => {
                    debug!("DTMF '{}' from {:?}", tone, originator);
                    None
                }
            }
        };
        if let Some(next) = next {
            self.apply_state(next);
        }
    }

    fn apply_state(&self, next: CallState) {
        let (previous, answered_at, finished) = {
            let mut slot = self.inner.slot.lock();
            if slot.state == next {
                return;
            }
            let previous = slot.state;
            slot.state = next;
            let finished = if next.is_terminal() {
                slot.session = None;
                slot.local_hold = false;
                slot.remote_hold = false;
                slot.subscription.take()
            } else {
                None
            };
            (previous, slot.answered_at, finished)
        };

        match next {
            CallState::Active => self
                .inner
                .duration
                .start(answered_at.unwrap_or_else(Instant::now)),
            CallState::Ended | CallState::Failed => self.inner.duration.stop(),
            _ => {}
        }
        if let Some(subscription) = finished {
            subscription.cancel();
        }

        debug!("Call state {} -> {}", previous, next);
        self.inner.listeners.emit(&CallStateChange {
            previous,
            current: next,
        });
    }
}
