//! Session and access-grant storage for runbridge.
//!
//! This crate defines the authoritative records for compute sessions and the
//! access grants bound to them, together with the [`Store`] trait every other
//! component goes through. The contract the rest of the system relies on is
//! the conditional update: a transition is applied only if the record still
//! looks the way the caller expects, so a foreground handler and the
//! reconciliation supervisor can race on the same session without clobbering
//! each other.
//!
//! The bundled engine is [`MemoryStore`], a process-local map behind a
//! `parking_lot::RwLock`. Durable engines are deliberately out of scope; any
//! backend that can run the decision closure atomically (for SQL, inside a
//! transaction) can implement [`Store`] without touching the state-machine
//! logic layered on top.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use types::{AccessGrant, Session, SessionState};

use runbridge_core::{AccessToken, SessionId};

/// Outcome of a conditional session update.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The decision closure accepted the update; the new record is returned.
    Applied(Session),
    /// The decision closure refused; the untouched current record is
    /// returned so the caller can shape a precise error.
    Rejected(Session),
    /// No session with that id exists.
    NotFound,
}

/// The storage trait defining all session and grant operations.
///
/// Implementations must make [`Store::update_session`] atomic: the decision
/// closure observes the current record and either commits a replacement or
/// refuses, with no other writer interleaving.
pub trait Store: Send + Sync {
    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or overwrite a session record.
    ///
    /// Used only for registration; transitions go through
    /// [`Store::update_session`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn put_session(&self, session: &Session) -> Result<()>;

    /// Get a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// List every session record.
    ///
    /// The reconciliation supervisor sweeps this; listings for renters are
    /// filtered above the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn list_sessions(&self) -> Result<Vec<Session>>;

    /// Remove a session record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    fn remove_session(&self, session_id: &SessionId) -> Result<()>;

    /// Atomically update a session, conditioned on its current state.
    ///
    /// `decide` runs under the store's write lock. It returns `Some(next)` to
    /// commit the replacement record, or `None` to refuse (the current record
    /// no longer satisfies the caller's expectation).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn update_session<F>(&self, session_id: &SessionId, decide: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Session) -> Option<Session>;

    // =========================================================================
    // Grant Operations
    // =========================================================================

    /// Bind a grant to its session, replacing any prior grant for that
    /// session. The replaced token becomes unresolvable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn put_grant(&self, grant: &AccessGrant) -> Result<()>;

    /// Look up the grant for a token.
    ///
    /// This is the raw mapping; fail-closed checks for terminated sessions
    /// live in the access broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn grant_for_token(&self, token: &AccessToken) -> Result<Option<AccessGrant>>;

    /// Look up the live grant for a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn grant_for_session(&self, session_id: &SessionId) -> Result<Option<AccessGrant>>;

    /// Remove a grant by token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    fn remove_grant(&self, token: &AccessToken) -> Result<()>;
}
