use std::collections::HashMap;

use super::types::{ConferenceId, ConferenceState, Participant};

/// Which participant field changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticipantChange {
    Muted(bool),
}

/// Delivered to every conference listener
#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    Created {
        conference_id: ConferenceId,
        uri: String,
    },
    Joined {
        conference_id: ConferenceId,
        uri: String,
    },
    StateChanged {
        conference_id: ConferenceId,
        previous: ConferenceState,
        current: ConferenceState,
    },
    ParticipantJoined {
        conference_id: ConferenceId,
        participant: Participant,
    },
    ParticipantLeft {
        conference_id: ConferenceId,
        participant: Participant,
        reason: Option<String>,
    },
    ParticipantUpdated {
        conference_id: ConferenceId,
        participant: Participant,
        change: ParticipantChange,
    },
    Locked {
        conference_id: ConferenceId,
    },
    Unlocked {
        conference_id: ConferenceId,
    },
    RecordingStarted {
        conference_id: ConferenceId,
    },
    RecordingStopped {
        conference_id: ConferenceId,
    },
    /// Raw levels keyed by participant address
    AudioLevel {
        conference_id: ConferenceId,
        levels: HashMap<String, f32>,
    },
    Ended {
        conference_id: ConferenceId,
    },
}

impl ConferenceEvent {
    pub fn conference_id(&self) -> &ConferenceId {
        match self {
            ConferenceEvent::Created { conference_id, .. }
            | ConferenceEvent::Joined { conference_id, .. }
            | ConferenceEvent::StateChanged { conference_id, .. }
            | ConferenceEvent::ParticipantJoined { conference_id, .. }
            | ConferenceEvent::ParticipantLeft { conference_id, .. }
            | ConferenceEvent::ParticipantUpdated { conference_id, .. }
            | ConferenceEvent::Locked { conference_id }
            | ConferenceEvent::Unlocked { conference_id }
            | ConferenceEvent::RecordingStarted { conference_id }
            | ConferenceEvent::RecordingStopped { conference_id }
            | ConferenceEvent::AudioLevel { conference_id, .. }
            | ConferenceEvent::Ended { conference_id } => conference_id,
        }
    }
}
