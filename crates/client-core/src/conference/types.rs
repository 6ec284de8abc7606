//! Conference data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique conference identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConferenceId(pub String);

impl ConferenceId {
    pub fn new() -> Self {
        Self(format!("conf-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique participant identifier; the same address joining twice gets two ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new() -> Self {
        Self(format!("participant-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conference lifecycle. `Failed` is only reached when create or join fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConferenceState {
    #[default]
    Idle,
    Active,
    Ending,
    Ended,
    Failed,
}

impl ConferenceState {
    /// Whether this conference blocks creating or joining another one
    pub fn is_live(self) -> bool {
        matches!(self, Self::Idle | Self::Active | Self::Ending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    Connecting,
    Connected,
    OnHold,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub uri: String,
    pub display_name: Option<String>,
    pub state: ParticipantState,
    pub is_moderator: bool,
    /// The local user
    pub is_self: bool,
    pub is_muted: bool,
    /// Last reported level, `None` until measured
    pub audio_level: Option<f32>,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub(crate) fn new(uri: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: ParticipantId::new(),
            uri: uri.into(),
            display_name,
            state: ParticipantState::Connected,
            is_moderator: false,
            is_self: false,
            is_muted: false,
            audio_level: None,
            joined_at: Utc::now(),
        }
    }

    pub(crate) fn local(uri: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            is_moderator: true,
            is_self: true,
            ..Self::new(uri, display_name)
        }
    }
}

/// Options for creating or joining a conference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceOptions {
    /// Capacity including the local participant; `None` is unlimited
    pub max_participants: Option<usize>,
    pub locked: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConferenceOptions {
    pub fn with_max_participants(mut self, max: usize) -> Self {
        self.max_participants = Some(max);
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Snapshot of a conference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conference {
    pub id: ConferenceId,
    pub uri: String,
    pub state: ConferenceState,
    pub max_participants: Option<usize>,
    pub is_locked: bool,
    pub is_recording: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Roster in join order
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Conference {
    pub(crate) fn new(id: ConferenceId, uri: String, options: &ConferenceOptions) -> Self {
        Self {
            id,
            uri,
            state: ConferenceState::Idle,
            max_participants: options.max_participants,
            is_locked: options.locked,
            is_recording: false,
            metadata: options.metadata.clone(),
            participants: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub(crate) fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.id == id)
    }

    pub fn local_participant(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_self)
    }

    pub fn is_full(&self) -> bool {
        self.max_participants
            .is_some_and(|max| self.participants.len() >= max)
    }
}
