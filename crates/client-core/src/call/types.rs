use serde::{Deserialize, Serialize};
use std::fmt;

/// Call state as presented to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallState {
    #[default]
    Idle,
    /// Outgoing request sent, no response yet
    Calling,
    /// Ringing, either side
    Ringing,
    Active,
    /// Held by either party
    Held,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Media is flowing or paused by hold
    pub fn is_connected(self) -> bool {
        matches!(self, CallState::Active | CallState::Held)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Calling => "calling",
            CallState::Ringing => "ringing",
            CallState::Active => "active",
            CallState::Held => "held",
            CallState::Ended => "ended",
            CallState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Delivered to state listeners on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStateChange {
    pub previous: CallState,
    pub current: CallState,
}
