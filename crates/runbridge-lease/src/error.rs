//! Error types for lease operations.

use runbridge_core::SessionId;
use runbridge_store::SessionState;
use thiserror::Error;

/// A result type using `LeaseError`.
pub type Result<T> = std::result::Result<T, LeaseError>;

/// Errors that can occur while brokering leases.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The requested session was not found (or is terminated and must be
    /// re-registered).
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The access token does not resolve to a usable session. Tokens for
    /// terminated sessions land here too: lookups fail closed.
    #[error("invalid or expired access token")]
    InvalidToken,

    /// Another principal holds the lease.
    #[error("session {0} is in use by another principal")]
    LeasedByOther(SessionId),

    /// The caller does not match the principal and IP pinned at lock time.
    #[error("caller does not match the lease owner for session {0}")]
    OwnerMismatch(SessionId),

    /// The session has no active lease to heartbeat or release.
    #[error("session {0} is not currently leased")]
    NotLeased(SessionId),

    /// The requested state transition is not valid.
    #[error("invalid state transition for session {session_id}: cannot transition from {from:?} to {to:?}")]
    InvalidState {
        /// The session being transitioned.
        session_id: SessionId,
        /// The current state.
        from: SessionState,
        /// The requested target state.
        to: SessionState,
    },

    /// The registration payload was rejected.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] runbridge_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeaseError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) => 404,
            Self::InvalidToken | Self::OwnerMismatch(_) => 403,
            Self::LeasedByOther(_) | Self::NotLeased(_) | Self::InvalidState { .. } => 409,
            Self::InvalidRegistration(_) => 400,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }
}
