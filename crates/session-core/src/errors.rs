//! Error types for session-core

use thiserror::Error;

use crate::session::SessionState;

/// Result type for session-core operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by sessions and the mock endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Address did not match `scheme:user@host`
    #[error("Invalid SIP URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Operation needs a state the session is not in
    #[error("Cannot {operation} session in state {state:?}")]
    InvalidOperation { operation: String, state: SessionState },

    #[error("Session {0} has ended")]
    SessionEnded(String),

    /// The owning mock server is gone
    #[error("Mock server has been destroyed")]
    ServerDestroyed,

    /// Failure injected through the server configuration
    #[error("Simulated {operation} failure")]
    Injected { operation: String },
}

impl SessionError {
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_operation(operation: impl Into<String>, state: SessionState) -> Self {
        Self::InvalidOperation {
            operation: operation.into(),
            state,
        }
    }

    pub fn injected(operation: impl Into<String>) -> Self {
        Self::Injected {
            operation: operation.into(),
        }
    }
}
