//! Mock SIP endpoint.
//!
//! Every simulated action is delivered after the configured network latency
//! through a [`TimerRegistry`]. Session-scoped actions are registered under the
//! session id, so ending a session cancels whatever was still in flight for it
//! and the registry's liveness probe drops anything that slips through once
//! the session has left the active set.

use parking_lot::{Mutex, RwLock};
use sipmesh_infra_common::{EventDispatchTable, HandlerId, TimerRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::MockServerConfig;
use super::events::{ServerEvent, ServerEventKind};
use crate::errors::{Result, SessionError};
use crate::session::{
    Direction, Identity, Originator, Session, SessionEvent, SessionId, SessionState,
};
use crate::uri::SipUri;

type SessionMap = Arc<Mutex<HashMap<SessionId, Arc<Session>>>>;

pub(crate) struct ServerCore {
    config: RwLock<MockServerConfig>,
    sessions: SessionMap,
    timers: TimerRegistry,
    events: EventDispatchTable<ServerEvent>,
    connected: AtomicBool,
    registered: AtomicBool,
}

impl Drop for ServerCore {
    fn drop(&mut self) {
        self.timers.cancel_all();
    }
}

/// Latency-parameterized stand-in for a SIP server.
///
/// Cloning is cheap and every clone drives the same endpoint.
#[derive(Clone)]
pub struct MockSipServer {
    core: Arc<ServerCore>,
}

impl Default for MockSipServer {
    fn default() -> Self {
        Self::new(MockServerConfig::default())
    }
}

impl std::fmt::Debug for MockSipServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSipServer")
            .field("config", &*self.core.config.read())
            .field("sessions", &self.session_count())
            .field("connected", &self.is_connected())
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl MockSipServer {
    pub fn new(config: MockServerConfig) -> Self {
        let sessions: SessionMap = Arc::new(Mutex::new(HashMap::new()));
        let live = sessions.clone();
        let timers = TimerRegistry::with_liveness(
            "mock-sip-server",
            Arc::new(move |owner: &str| live.lock().contains_key(&SessionId(owner.to_string()))),
        );
        Self {
            core: Arc::new(ServerCore {
                config: RwLock::new(config),
                sessions,
                timers,
                events: EventDispatchTable::new("mock-sip-server"),
                connected: AtomicBool::new(false),
                registered: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_core(core: Arc<ServerCore>) -> Self {
        Self { core }
    }

    fn downgrade(&self) -> Weak<ServerCore> {
        Arc::downgrade(&self.core)
    }

    pub fn config(&self) -> MockServerConfig {
        self.core.config.read().clone()
    }

    /// Replace the configuration; applies to actions simulated afterwards
    pub fn set_config(&self, config: MockServerConfig) {
        *self.core.config.write() = config;
    }

    pub fn network_latency(&self) -> Duration {
        self.core.config.read().network_latency
    }

    // ---- listeners ----

    pub fn on<F>(&self, kind: ServerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.core.events.on(kind, handler)
    }

    pub fn once<F>(&self, kind: ServerEventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.core.events.once(kind, handler)
    }

    pub fn off(&self, kind: ServerEventKind, id: HandlerId) -> bool {
        self.core.events.off(kind, id)
    }

    pub fn remove_all_listeners(&self) {
        self.core.events.remove_all_listeners();
    }

    // ---- queries ----

    pub fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.core.registered.load(Ordering::SeqCst)
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.core.sessions.lock().get(id).cloned()
    }

    pub fn active_sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.core.sessions.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at());
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.core.sessions.lock().len()
    }

    /// Simulated events not yet delivered
    pub fn pending_event_count(&self) -> usize {
        self.core.timers.pending_count()
    }

    pub fn pending_session_event_count(&self, id: &SessionId) -> usize {
        self.core.timers.owner_pending_count(id.as_str())
    }

    // ---- scheduling ----

    fn schedule_endpoint<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce(&MockSipServer) + Send + 'static,
    {
        let core = self.downgrade();
        self.core.timers.schedule(delay, move || {
            if let Some(core) = core.upgrade() {
                action(&MockSipServer { core });
            }
        });
    }

    fn schedule_session<F>(&self, session: &Session, delay: Duration, action: F)
    where
        F: FnOnce(&MockSipServer, Arc<Session>) + Send + 'static,
    {
        let core = self.downgrade();
        let id = session.id().clone();
        let owner = id.to_string();
        self.core.timers.schedule_for(&owner, delay, move || {
            let Some(core) = core.upgrade() else {
                return;
            };
            let session = core.sessions.lock().get(&id).cloned();
            if let Some(session) = session {
                action(&MockSipServer { core }, session);
            }
        });
    }

    fn require_active(&self, session: &Session) -> Result<()> {
        if self.core.sessions.lock().contains_key(session.id()) {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound(session.id().to_string()))
        }
    }

    fn emit(&self, event: ServerEvent) {
        self.core.events.emit(&event);
    }

    // ---- endpoint-level simulation ----

    /// Open the transport; fires `Connected`, or `Disconnected` when failure is injected
    pub fn connect(&self) -> Result<()> {
        if self.core.config.read().fail_connection {
            warn!("Mock connect failing by configuration");
            self.simulate_disconnect();
            return Err(SessionError::injected("connect"));
        }
        self.simulate_connect();
        Ok(())
    }

    pub fn disconnect(&self) {
        self.simulate_disconnect();
    }

    /// Register the local identity; fires `Registered` when auto-register is on
    pub fn register(&self) -> Result<()> {
        let (fail, auto) = {
            let config = self.core.config.read();
            (config.fail_registration, config.auto_register)
        };
        if fail {
            warn!("Mock registration failing by configuration");
            self.simulate_registration_failed("Simulated registration failure");
            return Err(SessionError::injected("register"));
        }
        if auto {
            self.simulate_registered();
        }
        Ok(())
    }

    pub fn unregister(&self) {
        self.simulate_unregistered();
    }

    pub fn simulate_connect(&self) {
        self.schedule_endpoint(self.network_latency(), |server| {
            server.core.connected.store(true, Ordering::SeqCst);
            server.emit(ServerEvent::Connected);
        });
    }

    pub fn simulate_disconnect(&self) {
        self.schedule_endpoint(self.network_latency(), |server| {
            server.core.connected.store(false, Ordering::SeqCst);
            server.core.registered.store(false, Ordering::SeqCst);
            server.emit(ServerEvent::Disconnected);
        });
    }

    pub fn simulate_registered(&self) {
        let expires = self.core.config.read().registration_expires;
        self.schedule_endpoint(self.network_latency(), move |server| {
            server.core.registered.store(true, Ordering::SeqCst);
            server.emit(ServerEvent::Registered { expires });
        });
    }

    pub fn simulate_registration_failed(&self, cause: impl Into<String>) {
        let cause = cause.into();
        self.schedule_endpoint(self.network_latency(), move |server| {
            server.core.registered.store(false, Ordering::SeqCst);
            server.emit(ServerEvent::RegistrationFailed { cause });
        });
    }

    pub fn simulate_unregistered(&self) {
        self.schedule_endpoint(self.network_latency(), |server| {
            server.core.registered.store(false, Ordering::SeqCst);
            server.emit(ServerEvent::Unregistered);
        });
    }

    // ---- call creation ----

    fn create_session(
        &self,
        direction: Direction,
        local: &SipUri,
        remote: &SipUri,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(
            direction,
            Identity::new(local.clone()),
            Identity::new(remote.clone()),
            self.downgrade(),
        ));
        self.core
            .sessions
            .lock()
            .insert(session.id().clone(), session.clone());
        session
    }

    fn announce(&self, session: &Arc<Session>, from: SipUri, to: SipUri, originator: Originator) {
        self.schedule_session(session, self.network_latency(), move |server, session| {
            server.emit(ServerEvent::NewSession {
                session,
                from,
                to,
                originator,
            });
        });
    }

    /// A remote party calls `to_uri`. The returned session is ringing; a
    /// `NewSession` event follows after the network latency.
    pub fn simulate_incoming_call(&self, from_uri: &str, to_uri: &str) -> Result<Arc<Session>> {
        let from = SipUri::parse(from_uri)?;
        let to = SipUri::parse(to_uri)?;
        let session = self.create_session(Direction::Incoming, &to, &from);
        info!("Simulated incoming call {} from {} to {}", session.id(), from, to);
        self.announce(&session, from, to, Originator::Remote);
        Ok(session)
    }

    /// Place a call from `from_uri` to `to_uri`. With auto-accept on, the
    /// call rings after one latency period and is answered after two.
    pub fn simulate_outgoing_call(&self, from_uri: &str, to_uri: &str) -> Result<Arc<Session>> {
        let from = SipUri::parse(from_uri)?;
        let to = SipUri::parse(to_uri)?;
        let session = self.create_session(Direction::Outgoing, &from, &to);
        info!("Simulated outgoing call {} from {} to {}", session.id(), from, to);
        self.announce(&session, from, to, Originator::Local);

        if self.core.config.read().auto_accept_calls {
            let latency = self.network_latency();
            self.schedule_session(&session, latency, |_, session| apply_progress(&session));
            self.schedule_session(&session, latency * 2, |_, session| {
                apply_accepted(&session);
                apply_confirmed(&session);
            });
        }
        Ok(session)
    }

    // ---- session-level simulation ----

    pub fn simulate_call_progress(&self, session: &Session) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), |_, session| {
            apply_progress(&session)
        });
        Ok(())
    }

    pub fn simulate_call_accepted(&self, session: &Session) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), |_, session| {
            apply_accepted(&session)
        });
        Ok(())
    }

    pub fn simulate_call_confirmed(&self, session: &Session) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), |_, session| {
            apply_confirmed(&session)
        });
        Ok(())
    }

    /// Accept and confirm in one step, the way a local answer completes
    pub fn simulate_call_answered(&self, session: &Session) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), |_, session| {
            apply_accepted(&session);
            apply_confirmed(&session);
        });
        Ok(())
    }

    pub fn simulate_hold(&self, session: &Session, originator: Originator) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), move |_, session| {
            if session.set_hold(originator, true) {
                session.emit(&SessionEvent::Hold { originator });
            }
        });
        Ok(())
    }

    pub fn simulate_unhold(&self, session: &Session, originator: Originator) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), move |_, session| {
            if session.set_hold(originator, false) {
                session.emit(&SessionEvent::Unhold { originator });
            }
        });
        Ok(())
    }

    pub fn simulate_refer(&self, session: &Session, target: impl Into<String>) -> Result<()> {
        self.require_active(session)?;
        let target = target.into();
        self.schedule_session(session, self.network_latency(), move |_, session| {
            session.emit(&SessionEvent::Refer { target });
        });
        Ok(())
    }

    pub fn simulate_dtmf(&self, session: &Session, tone: char) -> Result<()> {
        self.require_active(session)?;
        self.schedule_session(session, self.network_latency(), move |_, session| {
            if session.state() == SessionState::Established {
                session.emit(&SessionEvent::NewDtmf {
                    tone,
                    originator: Originator::Remote,
                });
            }
        });
        Ok(())
    }

    /// Tear the session down. Pending events for it are cancelled at once;
    /// `Ended` fires and the session leaves the active set after the latency.
    pub fn simulate_call_ended(
        &self,
        session: &Session,
        originator: Originator,
        cause: impl Into<String>,
    ) -> Result<()> {
        self.require_active(session)?;
        let cancelled = self.core.timers.cancel_owner(session.id().as_str());
        debug!("Ending session {}, dropped {} pending event(s)", session.id(), cancelled);
        let cause = cause.into();
        self.schedule_session(session, self.network_latency(), move |server, session| {
            server.finish(&session, SessionEvent::Ended { originator, cause });
        });
        Ok(())
    }

    /// Call setup failed; like [`simulate_call_ended`](Self::simulate_call_ended)
    /// but fires `Failed`.
    pub fn simulate_call_failed(
        &self,
        session: &Session,
        originator: Originator,
        cause: impl Into<String>,
    ) -> Result<()> {
        self.require_active(session)?;
        self.core.timers.cancel_owner(session.id().as_str());
        let cause = cause.into();
        self.schedule_session(session, self.network_latency(), move |server, session| {
            server.finish(&session, SessionEvent::Failed { originator, cause });
        });
        Ok(())
    }

    /// Terminate an active session by id
    pub fn terminate_session(&self, id: &SessionId) -> Result<()> {
        let session = self
            .session(id)
            .ok_or_else(|| SessionError::SessionNotFound(id.to_string()))?;
        self.simulate_call_ended(&session, Originator::Local, "Terminated")
    }

    fn finish(&self, session: &Arc<Session>, event: SessionEvent) {
        let cause = match &event {
            SessionEvent::Ended { cause, .. } | SessionEvent::Failed { cause, .. } => cause.clone(),
            _ => String::new(),
        };
        if !session.mark_ended(&cause) {
            return;
        }
        self.core.sessions.lock().remove(session.id());
        self.core.timers.cancel_owner(session.id().as_str());
        session.emit(&event);
    }

    // ---- lifecycle ----

    /// Drop every session, pending event and listener and clear the
    /// connection flags. The endpoint is usable again afterwards.
    pub fn reset(&self) {
        let cancelled = self.core.timers.cancel_all();
        let sessions: Vec<_> = self.core.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.remove_all_listeners();
        }
        self.core.connected.store(false, Ordering::SeqCst);
        self.core.registered.store(false, Ordering::SeqCst);
        self.core.events.remove_all_listeners();
        self.core.timers.revive();
        debug!(
            "Mock server reset: {} session(s), {} pending event(s) dropped",
            sessions.len(),
            cancelled
        );
    }

    /// Suppress every already-scheduled event, then [`reset`](Self::reset)
    pub fn destroy(&self) {
        self.core.timers.destroy();
        self.reset();
        info!("Mock server destroyed");
    }
}

fn apply_progress(session: &Session) {
    let state = session.state();
    if state == SessionState::InProgress || session.advance(SessionState::InProgress) {
        session.emit(&SessionEvent::Progress);
    } else {
        debug!("Session {} progress ignored in state {:?}", session.id(), state);
    }
}

fn apply_accepted(session: &Session) {
    if session.advance(SessionState::Established) {
        session.emit(&SessionEvent::Accepted);
    }
}

fn apply_confirmed(session: &Session) {
    if session.set_confirmed() {
        session.emit(&SessionEvent::Confirmed);
    }
}
