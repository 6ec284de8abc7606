//! End-to-end lifecycle tests for the mock endpoint
//!
//! Covers:
//! - stale session events never fire after termination
//! - destroy suppresses every scheduled callback
//! - local call control through the session entity

use parking_lot::Mutex;
use sipmesh_infra_common::logging::init_test_logging;
use sipmesh_session_core::{
    MockServerConfig, MockSipServer, Originator, Result, ServerEvent, ServerEventKind,
    SessionError, SessionEvent, SessionEventKind, SessionState,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const ALICE: &str = "sip:alice@example.com";
const BOB: &str = "sip:bob@example.com";

fn server(latency_ms: u64) -> MockSipServer {
    init_test_logging();
    MockSipServer::new(
        MockServerConfig::default().with_network_latency(Duration::from_millis(latency_ms)),
    )
}

fn record(events: &Arc<Mutex<Vec<String>>>, label: &str) -> impl Fn(&SessionEvent) + Send + Sync + use<> {
    let events = events.clone();
    let label = label.to_string();
    move |_| events.lock().push(label.clone())
}

#[tokio::test(start_paused = true)]
async fn test_terminated_session_drops_stale_events() -> Result<()> {
    let server = server(50);
    let session = server.simulate_outgoing_call(ALICE, BOB)?;
    let log = Arc::new(Mutex::new(Vec::new()));
    session.on(SessionEventKind::Progress, record(&log, "progress"));
    session.on(SessionEventKind::Accepted, record(&log, "accepted"));
    session.on(SessionEventKind::Confirmed, record(&log, "confirmed"));
    session.on(SessionEventKind::Ended, record(&log, "ended"));

    server.simulate_call_progress(&session)?;
    server.simulate_call_accepted(&session)?;
    sleep(Duration::from_millis(10)).await;
    server.simulate_call_ended(&session, Originator::Remote, "Cancelled")?;

    sleep(Duration::from_secs(1)).await;
    assert_eq!(*log.lock(), vec!["ended".to_string()]);
    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(server.session_count(), 0);
    assert_eq!(server.pending_event_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auto_accept_cancelled_by_early_hangup() -> Result<()> {
    let server = MockSipServer::new(
        MockServerConfig::default()
            .with_network_latency(Duration::from_millis(40))
            .with_auto_accept_calls(true),
    );
    let session = server.simulate_outgoing_call(ALICE, BOB)?;
    let log = Arc::new(Mutex::new(Vec::new()));
    session.on(SessionEventKind::Progress, record(&log, "progress"));
    session.on(SessionEventKind::Accepted, record(&log, "accepted"));

    sleep(Duration::from_millis(50)).await;
    session.terminate()?;
    sleep(Duration::from_millis(500)).await;

    assert_eq!(*log.lock(), vec!["progress".to_string()]);
    assert!(session.is_ended());
    assert_eq!(session.end_cause().as_deref(), Some("Terminated"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroy_suppresses_all_timer_kinds() -> Result<()> {
    let server = server(20);
    let fired = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        ServerEventKind::Connected,
        ServerEventKind::Registered,
        ServerEventKind::NewSession,
    ] {
        let fired = fired.clone();
        server.on(kind, move |event| fired.lock().push(format!("{:?}", event)));
    }

    server.connect()?;
    server.register()?;
    let session = server.simulate_incoming_call(ALICE, BOB)?;
    let session_log = Arc::new(Mutex::new(Vec::new()));
    session.on(SessionEventKind::Ended, record(&session_log, "ended"));
    server.simulate_call_ended(&session, Originator::Remote, "Bye")?;

    server.destroy();
    sleep(Duration::from_secs(10)).await;

    assert!(fired.lock().is_empty());
    assert!(session_log.lock().is_empty());
    assert!(!server.is_connected());
    assert!(!server.is_registered());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_incoming_call_answer_hold_transfer() -> Result<()> {
    let server = server(10);
    let announced = Arc::new(Mutex::new(None));
    let slot = announced.clone();
    server.on(ServerEventKind::NewSession, move |event| {
        if let ServerEvent::NewSession { session, .. } = event {
            *slot.lock() = Some(session.clone());
        }
    });

    let session = server.simulate_incoming_call(ALICE, BOB)?;
    sleep(Duration::from_millis(15)).await;
    let announced = announced.lock().clone().expect("new session announced");
    assert_eq!(announced.id(), session.id());
    assert_eq!(session.remote_identity().uri.to_string(), ALICE);

    session.answer()?;
    sleep(Duration::from_millis(15)).await;
    assert!(session.is_established());
    assert!(session.is_confirmed());

    session.hold()?;
    sleep(Duration::from_millis(15)).await;
    assert!(session.is_on_hold());
    session.unhold()?;
    sleep(Duration::from_millis(15)).await;
    assert!(!session.is_on_hold());

    let target = Arc::new(Mutex::new(None));
    let t = target.clone();
    session.on(SessionEventKind::Refer, move |event| {
        if let SessionEvent::Refer { target } = event {
            *t.lock() = Some(target.clone());
        }
    });
    session.refer("sip:carol@example.com")?;
    sleep(Duration::from_millis(15)).await;
    assert_eq!(target.lock().as_deref(), Some("sip:carol@example.com"));

    session.send_dtmf('1')?;
    session.send_dtmf('#')?;
    assert_eq!(session.sent_dtmf(), vec!['1', '#']);

    session.terminate()?;
    sleep(Duration::from_millis(15)).await;
    assert!(session.is_ended());
    assert!(!session.is_on_hold());
    assert!(matches!(session.terminate(), Err(SessionError::SessionEnded(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_operations_require_established_session() -> Result<()> {
    let server = server(10);
    let session = server.simulate_outgoing_call(ALICE, BOB)?;

    assert!(matches!(session.hold(), Err(SessionError::InvalidOperation { .. })));
    assert!(matches!(session.send_dtmf('1'), Err(SessionError::InvalidOperation { .. })));
    assert!(matches!(session.answer(), Err(SessionError::InvalidOperation { .. })));
    assert!(matches!(
        session.refer("not a uri"),
        Err(SessionError::InvalidOperation { .. })
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refer_after_server_dropped_is_not_recorded() -> Result<()> {
    let server = server(10);
    let session = server.simulate_incoming_call(ALICE, BOB)?;
    session.answer()?;
    sleep(Duration::from_millis(15)).await;
    assert!(session.is_established());

    drop(server);
    assert_eq!(
        session.refer("sip:carol@example.com"),
        Err(SessionError::ServerDestroyed)
    );
    assert!(session.refer_targets().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_state_and_listeners() -> Result<()> {
    let server = server(10);
    let connected = Arc::new(Mutex::new(0));
    let c = connected.clone();
    server.on(ServerEventKind::Connected, move |_| *c.lock() += 1);
    server.connect()?;
    sleep(Duration::from_millis(15)).await;
    server.simulate_incoming_call(ALICE, BOB)?;

    server.reset();
    assert_eq!(server.session_count(), 0);
    assert!(!server.is_connected());

    server.connect()?;
    sleep(Duration::from_millis(15)).await;
    assert!(server.is_connected());
    // the listener registered before reset is gone
    assert_eq!(*connected.lock(), 1);
    Ok(())
}
