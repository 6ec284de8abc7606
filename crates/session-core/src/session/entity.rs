//! The session entity.
//!
//! A [`Session`] is created by the mock endpoint when a call is placed or an
//! incoming call is detected, and leaves the endpoint's active set once its
//! `Ended` (or `Failed`) event fires. State only moves forward:
//! `Idle -> InProgress -> Established -> Ended`, skipping steps is allowed and
//! nothing leaves `Ended`. Hold flags are cleared when the session ends.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sipmesh_infra_common::{EventDispatchTable, HandlerId};
use std::fmt;
use std::sync::Weak;
use tracing::{debug, warn};

use super::events::{SessionEvent, SessionEventKind};
use super::types::{Direction, HoldState, Identity, Originator, SessionId, SessionState};
use crate::errors::{Result, SessionError};
use crate::mock::server::{MockSipServer, ServerCore};
use crate::uri::SipUri;

const DTMF_TONES: &str = "0123456789ABCD*#";

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    confirmed: bool,
    hold: HoldState,
    muted: bool,
    created_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    end_cause: Option<String>,
    sent_dtmf: Vec<char>,
    refer_targets: Vec<String>,
    renegotiations: u32,
}

/// One call leg
pub struct Session {
    id: SessionId,
    direction: Direction,
    local: Identity,
    remote: Identity,
    inner: Mutex<SessionInner>,
    events: EventDispatchTable<SessionEvent>,
    server: Weak<ServerCore>,
}

impl Session {
    pub(crate) fn new(
        direction: Direction,
        local: Identity,
        remote: Identity,
        server: Weak<ServerCore>,
    ) -> Self {
        let id = SessionId::new();
        // an incoming leg is already ringing when it is detected
        let state = match direction {
            Direction::Incoming => SessionState::InProgress,
            Direction::Outgoing => SessionState::Idle,
        };
        Self {
            events: EventDispatchTable::new(format!("session {}", id)),
            id,
            direction,
            local,
            remote,
            inner: Mutex::new(SessionInner {
                state,
                confirmed: false,
                hold: HoldState::default(),
                muted: false,
                created_at: Utc::now(),
                start_time: None,
                end_time: None,
                end_cause: None,
                sent_dtmf: Vec::new(),
                refer_targets: Vec::new(),
                renegotiations: 0,
            }),
            server,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn local_identity(&self) -> &Identity {
        &self.local
    }

    pub fn remote_identity(&self) -> &Identity {
        &self.remote
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_in_progress(&self) -> bool {
        self.state() == SessionState::InProgress
    }

    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    pub fn is_ended(&self) -> bool {
        self.state() == SessionState::Ended
    }

    pub fn is_confirmed(&self) -> bool {
        self.inner.lock().confirmed
    }

    pub fn hold_state(&self) -> HoldState {
        self.inner.lock().hold
    }

    pub fn is_on_hold(&self) -> bool {
        self.inner.lock().hold.is_held()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.lock().created_at
    }

    /// When the session became established
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().end_time
    }

    pub fn end_cause(&self) -> Option<String> {
        self.inner.lock().end_cause.clone()
    }

    /// Tones sent through [`send_dtmf`](Self::send_dtmf), oldest first
    pub fn sent_dtmf(&self) -> Vec<char> {
        self.inner.lock().sent_dtmf.clone()
    }

    pub fn refer_targets(&self) -> Vec<String> {
        self.inner.lock().refer_targets.clone()
    }

    pub fn renegotiation_count(&self) -> u32 {
        self.inner.lock().renegotiations
    }

    // ---- listeners ----

    pub fn on<F>(&self, kind: SessionEventKind, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn once<F>(&self, kind: SessionEventKind, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.once(kind, handler)
    }

    pub fn off(&self, kind: SessionEventKind, id: HandlerId) -> bool {
        self.events.off(kind, id)
    }

    pub fn remove_all_listeners(&self) {
        self.events.remove_all_listeners();
    }

    pub fn listener_count(&self, kind: SessionEventKind) -> usize {
        self.events.listener_count(kind)
    }

    // ---- call operations ----

    fn server(&self) -> Result<MockSipServer> {
        self.server
            .upgrade()
            .map(MockSipServer::from_core)
            .ok_or(SessionError::ServerDestroyed)
    }

    fn require(&self, operation: &str, allowed: &[SessionState]) -> Result<SessionState> {
        let state = self.state();
        if state == SessionState::Ended {
            return Err(SessionError::SessionEnded(self.id.to_string()));
        }
        if !allowed.contains(&state) {
            return Err(SessionError::invalid_operation(operation, state));
        }
        Ok(state)
    }

    /// Accept a ringing incoming call
    pub fn answer(&self) -> Result<()> {
        if self.direction != Direction::Incoming {
            return Err(SessionError::invalid_operation("answer outgoing", self.state()));
        }
        self.require("answer", &[SessionState::InProgress])?;
        let server = self.server()?;
        debug!("Answering session {}", self.id);
        server.simulate_call_answered(self)
    }

    /// Decline a ringing incoming call with a SIP status code
    pub fn reject(&self, status_code: u16) -> Result<()> {
        self.require("reject", &[SessionState::InProgress])?;
        let server = self.server()?;
        server.simulate_call_failed(self, Originator::Local, format!("Rejected ({})", status_code))
    }

    /// Put the call on local hold; no-op if already held locally
    pub fn hold(&self) -> Result<()> {
        self.require("hold", &[SessionState::Established])?;
        if self.hold_state().local {
            debug!("Session {} already on local hold", self.id);
            return Ok(());
        }
        self.server()?.simulate_hold(self, Originator::Local)
    }

    /// Release local hold; no-op if not held locally
    pub fn unhold(&self) -> Result<()> {
        self.require("unhold", &[SessionState::Established])?;
        if !self.hold_state().local {
            debug!("Session {} not on local hold", self.id);
            return Ok(());
        }
        self.server()?.simulate_unhold(self, Originator::Local)
    }

    /// Re-offer media on an established call
    pub fn renegotiate(&self) -> Result<()> {
        self.require("renegotiate", &[SessionState::Established])?;
        self.inner.lock().renegotiations += 1;
        Ok(())
    }

    /// Blind transfer to `target`
    pub fn refer(&self, target: &str) -> Result<()> {
        self.require("refer", &[SessionState::Established])?;
        let target = SipUri::parse(target)?.to_string();
        let server = self.server()?;
        self.inner.lock().refer_targets.push(target.clone());
        server.simulate_refer(self, target)
    }

    /// Send one DTMF tone; recorded and echoed as a `NewDtmf` event
    pub fn send_dtmf(&self, tone: char) -> Result<()> {
        self.require("send DTMF on", &[SessionState::Established])?;
        let tone = tone.to_ascii_uppercase();
        if !DTMF_TONES.contains(tone) {
            return Err(SessionError::invalid_operation(
                format!("send DTMF tone '{}' on", tone),
                self.state(),
            ));
        }
        self.inner.lock().sent_dtmf.push(tone);
        self.emit(&SessionEvent::NewDtmf {
            tone,
            originator: Originator::Local,
        });
        Ok(())
    }

    pub fn mute(&self) -> Result<()> {
        self.require("mute", &[SessionState::InProgress, SessionState::Established])?;
        self.inner.lock().muted = true;
        Ok(())
    }

    pub fn unmute(&self) -> Result<()> {
        self.require("unmute", &[SessionState::InProgress, SessionState::Established])?;
        self.inner.lock().muted = false;
        Ok(())
    }

    /// Hang up from the local side
    pub fn terminate(&self) -> Result<()> {
        self.require(
            "terminate",
            &[SessionState::Idle, SessionState::InProgress, SessionState::Established],
        )?;
        self.server()?
            .simulate_call_ended(self, Originator::Local, "Terminated")
    }

    // ---- state mutation, driven by the mock endpoint ----

    /// Move forward to `next`. Returns `false` (and changes nothing) when the
    /// move would go backwards or out of `Ended`.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.can_transition_to(next) {
            if inner.state != next {
                warn!("Session {} ignored transition {:?} -> {:?}", self.id, inner.state, next);
            }
            return false;
        }
        debug!("Session {} state: {:?} -> {:?}", self.id, inner.state, next);
        inner.state = next;
        if next == SessionState::Established {
            inner.start_time = Some(Utc::now());
        }
        true
    }

    pub(crate) fn set_confirmed(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Established || inner.confirmed {
            return false;
        }
        inner.confirmed = true;
        true
    }

    pub(crate) fn set_hold(&self, originator: Originator, held: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Established {
            return false;
        }
        let flag = match originator {
            Originator::Local => &mut inner.hold.local,
            Originator::Remote | Originator::System => &mut inner.hold.remote,
        };
        if *flag == held {
            return false;
        }
        *flag = held;
        true
    }

    pub(crate) fn mark_ended(&self, cause: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Ended {
            return false;
        }
        debug!("Session {} ended: {}", self.id, cause);
        inner.state = SessionState::Ended;
        inner.hold = HoldState::default();
        inner.end_time = Some(Utc::now());
        inner.end_cause = Some(cause.to_string());
        true
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        self.events.emit(event);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}
