//! Conference orchestration scenarios against the mock signaling client
//!
//! Covers:
//! - capacity, locking and self-removal rules
//! - participant guard release after a failed invite
//! - idempotent mute and recording toggles
//! - end-of-conference state sequence and the settle delay
//! - audio-level polling with and without the capability

use futures::future::join_all;
use parking_lot::Mutex;
use sipmesh_client_core::{
    ClientError, ConferenceConfig, ConferenceEvent, ConferenceManager, ConferenceOptions,
    ConferenceState, MockSignalingClient, ParticipantChange, Result, SignalingClient, SignalingOp,
};
use sipmesh_infra_common::logging::init_test_logging;
use sipmesh_session_core::{MockServerConfig, MockSipServer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};

const HOST: &str = "sip:host@example.com";
const ALICE: &str = "sip:alice@example.com";
const BOB: &str = "sip:bob@example.com";
const CAROL: &str = "sip:carol@example.com";

fn signaling() -> Arc<MockSignalingClient> {
    init_test_logging();
    let server = MockSipServer::new(
        MockServerConfig::default().with_network_latency(Duration::from_millis(20)),
    );
    Arc::new(MockSignalingClient::new(server, HOST))
}

fn manager(signaling: &Arc<MockSignalingClient>) -> ConferenceManager {
    let client: Arc<dyn SignalingClient> = signaling.clone();
    ConferenceManager::new(
        Some(client),
        ConferenceConfig::new(HOST)
            .with_display_name("Host")
            .with_audio_poll_interval(Duration::from_millis(50))
            .with_settle_delay(Duration::from_millis(100)),
    )
}

fn collect(manager: &ConferenceManager) -> Arc<Mutex<Vec<ConferenceEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.on_conference_event(move |event| sink.lock().push(event.clone()));
    events
}

fn state_changes(events: &[ConferenceEvent]) -> Vec<(ConferenceState, ConferenceState)> {
    events
        .iter()
        .filter_map(|event| match event {
            ConferenceEvent::StateChanged { previous, current, .. } => Some((*previous, *current)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_two_party_conference_end_to_end() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);

    let id = manager
        .create_conference(ConferenceOptions::default().with_max_participants(2))
        .await?;
    assert!(manager.is_active());
    let conference = manager.conference().expect("conference exists");
    assert!(conference.uri.starts_with("sip:conf-"));
    assert!(conference.uri.ends_with("@example.com"));
    let local = conference.local_participant().expect("local participant");
    assert!(local.is_moderator);
    assert_eq!(local.display_name.as_deref(), Some("Host"));

    manager.add_participant(ALICE, Some("Alice")).await?;
    assert_eq!(manager.participant_count(), 2);

    let err = manager.add_participant(BOB, None).await.unwrap_err();
    assert_eq!(err, ClientError::ConferenceFull);
    assert_eq!(err.to_string(), "Conference is full");
    assert_eq!(manager.participant_count(), 2);
    assert_eq!(signaling.request_count(SignalingOp::InviteToConference), 1);

    manager.end_conference().await?;
    assert_eq!(manager.state(), ConferenceState::Ended);
    assert!(!manager.is_polling_audio_levels());
    assert_eq!(
        state_changes(&events.lock()),
        vec![
            (ConferenceState::Idle, ConferenceState::Active),
            (ConferenceState::Active, ConferenceState::Ending),
            (ConferenceState::Ending, ConferenceState::Ended),
        ]
    );
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, ConferenceEvent::Ended { conference_id } if *conference_id == id)));

    sleep(Duration::from_millis(150)).await;
    assert!(manager.conference().is_none());
    assert_eq!(manager.state(), ConferenceState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_capacity_counts_local_participant() -> Result<()> {
    for capacity in 1..=4 {
        let signaling = signaling();
        let manager = manager(&signaling);
        manager
            .create_conference(ConferenceOptions::default().with_max_participants(capacity))
            .await?;
        for n in 1..capacity {
            manager
                .add_participant(&format!("sip:user{}@example.com", n), None)
                .await?;
        }
        assert_eq!(manager.participant_count(), capacity);
        assert_eq!(
            manager.add_participant("sip:late@example.com", None).await,
            Err(ClientError::ConferenceFull)
        );
        assert_eq!(manager.participant_count(), capacity);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_capacity_rejected() {
    let signaling = signaling();
    let manager = manager(&signaling);
    assert_eq!(
        manager
            .create_conference(ConferenceOptions::default().with_max_participants(0))
            .await,
        Err(ClientError::InvalidCapacity { capacity: 0 })
    );
    assert!(manager.conference().is_none());
    assert!(signaling.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_local_participant_cannot_be_removed() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;
    manager.add_participant(ALICE, None).await?;
    let local_id = manager
        .conference()
        .and_then(|c| c.local_participant().map(|p| p.id.clone()))
        .expect("local participant");

    assert_eq!(
        manager.remove_participant(&local_id, None).await,
        Err(ClientError::CannotRemoveSelf)
    );
    assert_eq!(manager.participant_count(), 2);
    assert_eq!(signaling.request_count(SignalingOp::RemoveFromConference), 0);

    manager.end_conference().await?;
    assert!(manager.remove_participant(&local_id, None).await.is_err());
    assert_eq!(manager.participant_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_remove_participant_emits_left_with_reason() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    manager.create_conference(ConferenceOptions::default()).await?;
    let alice = manager.add_participant(ALICE, Some("Alice")).await?;

    manager.remove_participant(&alice, Some("kicked")).await?;
    assert_eq!(manager.participant_count(), 1);
    assert!(manager.get_participant(&alice).is_none());
    assert!(events.lock().iter().any(|e| matches!(
        e,
        ConferenceEvent::ParticipantLeft { participant, reason, .. }
            if participant.id == alice && reason.as_deref() == Some("kicked")
    )));

    assert_eq!(
        manager.remove_participant(&alice, None).await,
        Err(ClientError::participant_not_found(alice.as_str()))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_invite_releases_participant_guard() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;

    signaling.fail_next(SignalingOp::InviteToConference);
    let err = manager.add_participant(ALICE, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Signaling { .. }));
    assert_eq!(manager.participant_count(), 1);

    manager.add_participant(ALICE, None).await?;
    assert_eq!(manager.participant_count(), 2);
    assert_eq!(signaling.request_count(SignalingOp::InviteToConference), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_adds_rejected() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;

    let (first, second) = tokio::join!(
        manager.add_participant(ALICE, None),
        manager.add_participant(BOB, None)
    );
    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(err.is_already_in_progress());
    assert_eq!(err.to_string(), "Participant operation already in progress");
    assert_eq!(manager.participant_count(), 2);

    manager.add_participant(CAROL, None).await?;
    assert_eq!(manager.participant_count(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_adds_admits_one() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;

    let uris: Vec<String> = (0..5).map(|n| format!("sip:caller{}@example.com", n)).collect();
    let results = join_all(uris.iter().map(|uri| manager.add_participant(uri, None))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(ClientError::is_already_in_progress));
    assert_eq!(manager.participant_count(), 2);
    assert_eq!(signaling.request_count(SignalingOp::InviteToConference), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mute_is_idempotent() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    manager.create_conference(ConferenceOptions::default()).await?;
    let alice = manager.add_participant(ALICE, None).await?;

    manager.mute_participant(&alice).await?;
    manager.mute_participant(&alice).await?;

    assert_eq!(signaling.request_count(SignalingOp::MuteParticipant), 1);
    let updates = events
        .lock()
        .iter()
        .filter(|e| matches!(e, ConferenceEvent::ParticipantUpdated { .. }))
        .count();
    assert_eq!(updates, 1);
    assert!(manager.get_participant(&alice).is_some_and(|p| p.is_muted));

    manager.unmute_participant(&alice).await?;
    assert_eq!(signaling.request_count(SignalingOp::UnmuteParticipant), 1);
    assert!(events.lock().iter().any(|e| matches!(
        e,
        ConferenceEvent::ParticipantUpdated { change: ParticipantChange::Muted(false), .. }
    )));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_muting_self_uses_local_audio() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;
    let local_id = manager
        .conference()
        .and_then(|c| c.local_participant().map(|p| p.id.clone()))
        .expect("local participant");

    manager.mute_participant(&local_id).await?;
    assert_eq!(signaling.request_count(SignalingOp::MuteAudio), 1);
    assert_eq!(signaling.request_count(SignalingOp::MuteParticipant), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_locked_conference_refuses_participants() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    manager.create_conference(ConferenceOptions::default()).await?;

    manager.lock_conference()?;
    manager.lock_conference()?;
    assert_eq!(
        manager.add_participant(ALICE, None).await,
        Err(ClientError::ConferenceLocked)
    );
    assert_eq!(signaling.request_count(SignalingOp::InviteToConference), 0);

    manager.unlock_conference()?;
    manager.add_participant(ALICE, None).await?;

    let locks = events
        .lock()
        .iter()
        .filter(|e| matches!(e, ConferenceEvent::Locked { .. } | ConferenceEvent::Unlocked { .. }))
        .count();
    assert_eq!(locks, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recording_toggles_once() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;

    manager.start_recording().await?;
    manager.start_recording().await?;
    assert!(manager.conference().is_some_and(|c| c.is_recording));
    assert_eq!(signaling.request_count(SignalingOp::StartRecording), 1);

    signaling.fail_next(SignalingOp::StopRecording);
    assert!(manager.stop_recording().await.is_err());
    assert!(manager.conference().is_some_and(|c| c.is_recording));

    manager.stop_recording().await?;
    assert!(manager.conference().is_some_and(|c| !c.is_recording));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_operations_require_active_conference() {
    let signaling = signaling();
    let manager = manager(&signaling);

    assert_eq!(
        manager.add_participant(ALICE, None).await,
        Err(ClientError::NoActiveConference)
    );
    assert_eq!(manager.lock_conference(), Err(ClientError::NoActiveConference));
    assert_eq!(manager.start_recording().await, Err(ClientError::NoActiveConference));
    assert_eq!(manager.end_conference().await, Err(ClientError::NoActiveConference));
    assert!(signaling.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_conference_rejected_while_active() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;

    assert_eq!(
        manager.create_conference(ConferenceOptions::default()).await,
        Err(ClientError::ConferenceAlreadyActive)
    );
    assert_eq!(
        manager.join_conference("sip:room@example.com", ConferenceOptions::default()).await,
        Err(ClientError::ConferenceAlreadyActive)
    );
    assert_eq!(signaling.request_count(SignalingOp::CreateConference), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_does_not_block_retry() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);

    signaling.fail_next(SignalingOp::CreateConference);
    assert!(manager.create_conference(ConferenceOptions::default()).await.is_err());
    assert_eq!(manager.state(), ConferenceState::Failed);
    assert_eq!(
        state_changes(&events.lock()),
        vec![(ConferenceState::Idle, ConferenceState::Failed)]
    );

    manager.create_conference(ConferenceOptions::default()).await?;
    assert!(manager.is_active());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_join_conference_by_address() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);

    manager
        .join_conference("room42@conf.example.com", ConferenceOptions::default())
        .await?;
    let conference = manager.conference().expect("joined");
    assert_eq!(conference.uri, "sip:room42@conf.example.com");
    assert_eq!(conference.participants.len(), 1);
    assert!(events.lock().iter().any(|e| matches!(
        e,
        ConferenceEvent::Joined { uri, .. } if uri == "sip:room42@conf.example.com"
    )));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_end_restores_active() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    manager.create_conference(ConferenceOptions::default()).await?;

    signaling.fail_next(SignalingOp::EndConference);
    assert!(manager.end_conference().await.is_err());
    assert!(manager.is_active());
    assert!(manager.is_polling_audio_levels());
    assert_eq!(
        state_changes(&events.lock()),
        vec![
            (ConferenceState::Idle, ConferenceState::Active),
            (ConferenceState::Active, ConferenceState::Ending),
            (ConferenceState::Ending, ConferenceState::Active),
        ]
    );

    manager.end_conference().await?;
    assert_eq!(manager.state(), ConferenceState::Ended);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_create_releases_slot() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);

    let abandoned = timeout(
        Duration::from_millis(5),
        manager.create_conference(ConferenceOptions::default()),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(manager.conference().is_none());
    assert_eq!(manager.state(), ConferenceState::Idle);

    let abandoned = timeout(
        Duration::from_millis(5),
        manager.join_conference("room42@conf.example.com", ConferenceOptions::default()),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(manager.conference().is_none());

    let id = manager.create_conference(ConferenceOptions::default()).await?;
    assert!(manager.is_active());
    assert_eq!(manager.conference().map(|c| c.id), Some(id));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_end_restores_active() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    manager.create_conference(ConferenceOptions::default()).await?;

    let abandoned = timeout(Duration::from_millis(5), manager.end_conference()).await;
    assert!(abandoned.is_err());
    assert!(manager.is_active());
    assert!(manager.is_polling_audio_levels());
    assert_eq!(
        state_changes(&events.lock()),
        vec![
            (ConferenceState::Idle, ConferenceState::Active),
            (ConferenceState::Active, ConferenceState::Ending),
            (ConferenceState::Ending, ConferenceState::Active),
        ]
    );

    assert_eq!(
        manager.create_conference(ConferenceOptions::default()).await,
        Err(ClientError::ConferenceAlreadyActive)
    );
    manager.end_conference().await?;
    assert_eq!(manager.state(), ConferenceState::Ended);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_new_conference_survives_previous_settle_delay() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;
    manager.end_conference().await?;

    let second = manager.create_conference(ConferenceOptions::default()).await?;
    sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.conference().map(|c| c.id), Some(second));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_levels_polled_while_active() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    let events = collect(&manager);
    signaling.set_audio_levels(Some(HashMap::from([
        (ALICE.to_string(), 0.5),
        ("sip:stranger@example.com".to_string(), 0.9),
    ])));

    manager.create_conference(ConferenceOptions::default()).await?;
    let alice = manager.add_participant(ALICE, None).await?;
    sleep(Duration::from_millis(120)).await;

    assert_eq!(manager.get_participant(&alice).and_then(|p| p.audio_level), Some(0.5));
    let polls = events
        .lock()
        .iter()
        .filter(|e| matches!(e, ConferenceEvent::AudioLevel { .. }))
        .count();
    assert!(polls >= 1);

    manager.end_conference().await?;
    let after_end = events.lock().len();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(events.lock().len(), after_end);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_audio_levels_skipped() -> Result<()> {
    let server = MockSipServer::new(MockServerConfig::default());
    let signaling = Arc::new(MockSignalingClient::new(server, HOST).without_audio_levels());
    let manager = manager(&signaling);
    let events = collect(&manager);
    signaling.set_audio_levels(Some(HashMap::from([(HOST.to_string(), 1.0)])));

    manager.create_conference(ConferenceOptions::default()).await?;
    sleep(Duration::from_millis(200)).await;
    assert!(manager.is_polling_audio_levels());
    assert!(!events
        .lock()
        .iter()
        .any(|e| matches!(e, ConferenceEvent::AudioLevel { .. })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_isolated() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.on_conference_event(|_| panic!("listener bug"));
    let events = collect(&manager);

    manager.create_conference(ConferenceOptions::default()).await?;
    assert!(!events.lock().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_settle_and_polling() -> Result<()> {
    let signaling = signaling();
    let manager = manager(&signaling);
    manager.create_conference(ConferenceOptions::default()).await?;
    manager.end_conference().await?;

    manager.dispose();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.state(), ConferenceState::Ended);
    assert!(!manager.is_polling_audio_levels());
    Ok(())
}

#[tokio::test]
async fn test_without_signaling_client() {
    let manager = ConferenceManager::new(None, ConferenceConfig::new(HOST));
    assert_eq!(
        manager.create_conference(ConferenceOptions::default()).await,
        Err(ClientError::NoSignalingClient)
    );
    assert_eq!(manager.state(), ConferenceState::Idle);
}
