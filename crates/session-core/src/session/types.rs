use serde::{Deserialize, Serialize};
use std::fmt;

use crate::uri::SipUri;

/// Opaque, unique session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress of a call leg. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    /// Trying or ringing
    InProgress,
    Established,
    Ended,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::InProgress => 1,
            SessionState::Established => 2,
            SessionState::Ended => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(self, next: SessionState) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Ended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Which side caused an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Originator {
    Local,
    Remote,
    System,
}

/// Local and remote hold flags, independent of each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldState {
    pub local: bool,
    pub remote: bool,
}

impl HoldState {
    pub fn is_held(&self) -> bool {
        self.local || self.remote
    }
}

/// Display name plus address of one end of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: Option<String>,
    pub uri: SipUri,
}

impl Identity {
    pub fn new(uri: SipUri) -> Self {
        Self {
            display_name: None,
            uri,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri),
            None => write!(f, "<{}>", self.uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotonic() {
        use SessionState::*;
        assert!(Idle.can_transition_to(InProgress));
        assert!(Idle.can_transition_to(Established));
        assert!(InProgress.can_transition_to(Ended));
        assert!(!Established.can_transition_to(InProgress));
        assert!(!Ended.can_transition_to(Established));
        assert!(!Ended.can_transition_to(Ended));
        assert!(Ended.is_terminal());
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new(SipUri::new("alice", "example.com")).with_display_name("Alice");
        assert_eq!(id.to_string(), "\"Alice\" <sip:alice@example.com>");
    }
}
