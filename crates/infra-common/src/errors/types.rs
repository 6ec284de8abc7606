use thiserror::Error;

/// Result type for infra-common operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared infrastructure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A guarded operation is already running on this entity
    #[error("{operation} operation already in progress")]
    AlreadyInProgress { operation: String },

    /// The operation observed an abort request and unwound
    #[error("{operation} aborted")]
    Aborted { operation: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an already-in-progress error
    pub fn already_in_progress(operation: impl Into<String>) -> Self {
        Self::AlreadyInProgress {
            operation: operation.into(),
        }
    }

    /// Create an aborted error
    pub fn aborted(operation: impl Into<String>) -> Self {
        Self::Aborted {
            operation: operation.into(),
        }
    }

    /// Whether this error came from a cooperative abort
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
