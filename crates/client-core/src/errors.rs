//! Error types for client-core

use sipmesh_session_core::SessionError;
use thiserror::Error;

/// Result type for client-core operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by call control, DTMF sequencing and conferencing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    // Validation
    #[error("Target address is empty")]
    EmptyTarget,

    #[error("Invalid target address format: {target}")]
    InvalidTarget { target: String },

    #[error("Invalid DTMF tone '{tone}': expected 0-9, A-D, * or #")]
    InvalidDtmfTone { tone: char },

    #[error("Invalid participant capacity {capacity}: must be at least 1")]
    InvalidCapacity { capacity: usize },

    // Preconditions
    /// `operation` names the action, e.g. "answer" gives "No active session to answer"
    #[error("No active session to {operation}")]
    NoActiveSession { operation: String },

    #[error("No active conference")]
    NoActiveConference,

    #[error("A conference is already active")]
    ConferenceAlreadyActive,

    #[error("No signaling client available")]
    NoSignalingClient,

    #[error("Conference is locked")]
    ConferenceLocked,

    #[error("Conference is full")]
    ConferenceFull,

    #[error("Participant not found: {id}")]
    ParticipantNotFound { id: String },

    #[error("Cannot remove the local participant; end the conference instead")]
    CannotRemoveSelf,

    #[error("A call is already active")]
    CallAlreadyActive,

    // Concurrency and cancellation
    #[error("{operation} operation already in progress")]
    AlreadyInProgress { operation: String },

    #[error("{operation} aborted")]
    Aborted { operation: String },

    // Collaborators
    #[error("Signaling error: {message}")]
    Signaling { message: String },

    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
        }
    }

    pub fn no_active_session(operation: impl Into<String>) -> Self {
        Self::NoActiveSession {
            operation: operation.into(),
        }
    }

    pub fn participant_not_found(id: impl Into<String>) -> Self {
        Self::ParticipantNotFound { id: id.into() }
    }

    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    pub fn aborted(operation: impl Into<String>) -> Self {
        Self::Aborted {
            operation: operation.into(),
        }
    }

    /// Whether the operation was cancelled rather than failed
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Whether the operation was rejected because another one was running
    pub fn is_already_in_progress(&self) -> bool {
        matches!(self, Self::AlreadyInProgress { .. })
    }
}

impl From<sipmesh_infra_common::Error> for ClientError {
    fn from(err: sipmesh_infra_common::Error) -> Self {
        use sipmesh_infra_common::Error;
        match err {
            Error::AlreadyInProgress { operation } => Self::AlreadyInProgress { operation },
            Error::Aborted { operation } => Self::Aborted { operation },
            Error::Config(message) | Error::Internal(message) => Self::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ClientError::no_active_session("answer").to_string(),
            "No active session to answer"
        );
        assert_eq!(ClientError::ConferenceFull.to_string(), "Conference is full");
        assert_eq!(ClientError::NoActiveConference.to_string(), "No active conference");
    }

    #[test]
    fn test_infra_errors_map_to_client_variants() {
        let err: ClientError = sipmesh_infra_common::Error::already_in_progress("DTMF").into();
        assert_eq!(err.to_string(), "DTMF operation already in progress");
        assert!(err.is_already_in_progress());

        let err: ClientError = sipmesh_infra_common::Error::aborted("Call").into();
        assert!(err.is_aborted());
    }
}
