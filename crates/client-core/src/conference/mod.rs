//! Conference orchestration over a [`SignalingClient`](crate::signaling::SignalingClient)

pub mod events;
pub mod manager;
pub mod types;

pub use events::{ConferenceEvent, ParticipantChange};
pub use manager::ConferenceManager;
pub use types::{
    Conference, ConferenceId, ConferenceOptions, ConferenceState, Participant, ParticipantId,
    ParticipantState,
};
