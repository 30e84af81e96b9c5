//! Session lease state machine.
//!
//! This module defines the valid state transitions for sessions and the pure
//! timeout logic the reconciliation supervisor applies. Nothing here touches
//! the store; callers pair a decision from this module with a conditional
//! store update.
//!
//! # State Machine
//!
//! ```text
//!        ┌─────────┐  access   ┌──────────┐
//!        │  Ready  │──────────▶│  Locked  │◀─────────────┐
//!        └────┬────┘           └────┬─────┘              │
//!             │                     │ (idle)             │ (same principal
//!             │                     ▼                    │  reconnects)
//!             │           ┌──────────────────┐           │
//!             │           │ LockedAbandoned  │───────────┘
//!             │           └────────┬─────────┘
//!             │   (release)        │ (grace expires)
//!             │        ┌───────────┴──┐
//!             │        ▼              ▼
//!             │  ┌──────────────────────┐
//!             │  │       Cleaning       │
//!             │  └──────────┬───────────┘
//!             │             │ (cleanup ack / stale)
//!             ▼             ▼
//!        ┌──────────────────────┐
//!        │      Terminated      │   (also reached from any non-Cleaning
//!        └──────────────────────┘    state when the provider goes silent)
//! ```

use chrono::{DateTime, Utc};
use runbridge_store::{Session, SessionState};

use crate::types::LeaseConfig;

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::{Cleaning, Locked, LockedAbandoned, Ready, Terminated};

    matches!(
        (from, to),
        // Ready can be leased, or die with its provider
        (Ready, Locked | Terminated)
            // Locked decays to abandoned, is released into cleaning, or dies
            | (Locked, LockedAbandoned | Cleaning | Terminated)
            // Abandoned is reclaimed by its owner, expires into cleaning, or dies
            | (LockedAbandoned, Locked | Cleaning | Terminated)
            // Cleaning only ever terminates
            | (Cleaning, Terminated)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(state: SessionState) -> Vec<SessionState> {
    use SessionState::{Cleaning, Locked, LockedAbandoned, Ready, Terminated};

    match state {
        Ready => vec![Locked, Terminated],
        Locked => vec![LockedAbandoned, Cleaning, Terminated],
        LockedAbandoned => vec![Locked, Cleaning, Terminated],
        Cleaning => vec![Terminated],
        Terminated => vec![],
    }
}

/// Returns true if the session can be leased by a principal with no prior
/// claim on it.
#[must_use]
pub const fn can_lease(state: SessionState) -> bool {
    matches!(state, SessionState::Ready)
}

/// Returns true if the session is in its terminal state.
#[must_use]
pub const fn is_terminal(state: SessionState) -> bool {
    matches!(state, SessionState::Terminated)
}

/// Returns true if a renter currently has a claim on the session.
#[must_use]
pub const fn is_leased(state: SessionState) -> bool {
    matches!(
        state,
        SessionState::Locked | SessionState::LockedAbandoned
    )
}

/// Why the sweep decided to terminate a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// No provider heartbeat for longer than the provider timeout.
    ProviderSilent,
    /// Cleanup never got acknowledged; the provider is presumed crashed.
    StaleCleaning,
}

impl TerminateReason {
    /// Stable string used in audit metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProviderSilent => "stale_provider",
            Self::StaleCleaning => "stale_cleaning",
        }
    }
}

/// A timeout-driven transition the supervisor should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Locked with no renter heartbeat for the idle timeout.
    MarkAbandoned,
    /// Abandoned past the grace window; start cleanup.
    BeginCleaning,
    /// Terminate the session.
    Terminate(TerminateReason),
}

/// Evaluate one session against the elapsed-time guards.
///
/// Provider silence is checked first: a session whose provider is gone is
/// terminated outright rather than cycled through abandonment. Sessions in
/// `Cleaning` are exempt from the provider-silence guard (they have their own
/// stale-cleaning timeout) and `Terminated` sessions are never touched, which
/// is what makes a sweep idempotent.
#[must_use]
pub fn sweep_action(
    session: &Session,
    now: DateTime<Utc>,
    config: &LeaseConfig,
) -> Option<SweepAction> {
    match session.status {
        SessionState::Terminated => None,

        SessionState::Cleaning => {
            let since = session.cleaning_at.unwrap_or(session.created_at);
            (now - since >= config.stale_cleaning_timeout())
                .then_some(SweepAction::Terminate(TerminateReason::StaleCleaning))
        }

        SessionState::Ready | SessionState::Locked | SessionState::LockedAbandoned => {
            if now - session.provider_last_seen >= config.provider_timeout() {
                return Some(SweepAction::Terminate(TerminateReason::ProviderSilent));
            }

            match session.status {
                SessionState::Locked => {
                    let last = session
                        .renter_last_seen
                        .or(session.locked_at)
                        .unwrap_or(session.created_at);
                    (now - last >= config.idle_timeout()).then_some(SweepAction::MarkAbandoned)
                }
                SessionState::LockedAbandoned => {
                    let since = session.abandoned_at.unwrap_or(session.created_at);
                    (now - since >= config.grace_window()).then_some(SweepAction::BeginCleaning)
                }
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use runbridge_core::{PrincipalId, ProviderId};

    fn session_in(status: SessionState, now: DateTime<Utc>) -> Session {
        let mut session = Session::new(
            ProviderId::generate(),
            "https://runtime.example".to_string(),
            "tok".to_string(),
            serde_json::Value::Null,
            serde_json::Value::Null,
            now,
        );
        session.status = status;
        session
    }

    #[test]
    fn valid_transitions() {
        use SessionState::*;

        assert!(is_valid_transition(Ready, Locked));
        assert!(is_valid_transition(Locked, LockedAbandoned));
        assert!(is_valid_transition(LockedAbandoned, Locked));
        assert!(is_valid_transition(LockedAbandoned, Cleaning));
        assert!(is_valid_transition(Locked, Cleaning));
        assert!(is_valid_transition(Cleaning, Terminated));
        assert!(is_valid_transition(Ready, Terminated));
        assert!(is_valid_transition(Locked, Terminated));
    }

    #[test]
    fn invalid_transitions() {
        use SessionState::*;

        // Terminated is absorbing
        assert!(!is_valid_transition(Terminated, Ready));
        assert!(!is_valid_transition(Terminated, Locked));
        assert!(!is_valid_transition(Terminated, Cleaning));
        // Cleaning never goes back into rotation
        assert!(!is_valid_transition(Cleaning, Ready));
        assert!(!is_valid_transition(Cleaning, Locked));
        // A lease cannot appear out of thin air
        assert!(!is_valid_transition(Ready, LockedAbandoned));
        assert!(!is_valid_transition(Ready, Cleaning));
        // Locked cannot silently become Ready again
        assert!(!is_valid_transition(Locked, Ready));
        assert!(!is_valid_transition(LockedAbandoned, Ready));
    }

    #[test]
    fn terminated_has_no_outgoing_edges() {
        assert!(valid_transitions_from(SessionState::Terminated).is_empty());
    }

    #[test]
    fn lease_predicates() {
        assert!(can_lease(SessionState::Ready));
        assert!(!can_lease(SessionState::Locked));
        assert!(!can_lease(SessionState::Cleaning));
        assert!(is_leased(SessionState::Locked));
        assert!(is_leased(SessionState::LockedAbandoned));
        assert!(!is_leased(SessionState::Ready));
        assert!(is_terminal(SessionState::Terminated));
        assert!(!is_terminal(SessionState::Cleaning));
    }

    #[test]
    fn sweep_leaves_fresh_sessions_alone() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let session = session_in(SessionState::Ready, now);
        assert_eq!(sweep_action(&session, now, &config), None);
    }

    #[test]
    fn sweep_terminates_on_provider_silence() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let session = session_in(SessionState::Ready, now);
        let later = now + config.provider_timeout() + Duration::seconds(1);
        assert_eq!(
            sweep_action(&session, later, &config),
            Some(SweepAction::Terminate(TerminateReason::ProviderSilent))
        );
    }

    #[test]
    fn sweep_provider_silence_wins_over_idle() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::Locked, now);
        session.locked_by = Some(PrincipalId::new("renter-1"));
        session.locked_at = Some(now);
        session.renter_last_seen = Some(now);

        // Both the renter and the provider have been silent for a long time.
        let later = now + config.provider_timeout() + Duration::seconds(1);
        assert_eq!(
            sweep_action(&session, later, &config),
            Some(SweepAction::Terminate(TerminateReason::ProviderSilent))
        );
    }

    #[test]
    fn sweep_marks_idle_lock_abandoned() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::Locked, now);
        session.renter_last_seen = Some(now);

        let later = now + config.idle_timeout() + Duration::seconds(1);
        // Keep the provider alive so only the renter guard fires.
        session.provider_last_seen = later;
        assert_eq!(
            sweep_action(&session, later, &config),
            Some(SweepAction::MarkAbandoned)
        );
    }

    #[test]
    fn sweep_starts_cleaning_after_grace() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::LockedAbandoned, now);
        session.abandoned_at = Some(now);

        let later = now + config.grace_window() + Duration::seconds(1);
        session.provider_last_seen = later;
        assert_eq!(
            sweep_action(&session, later, &config),
            Some(SweepAction::BeginCleaning)
        );
    }

    #[test]
    fn sweep_abandoned_within_grace_untouched() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::LockedAbandoned, now);
        session.abandoned_at = Some(now);

        let later = now + config.grace_window() - Duration::seconds(5);
        session.provider_last_seen = later;
        assert_eq!(sweep_action(&session, later, &config), None);
    }

    #[test]
    fn sweep_terminates_stale_cleaning() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::Cleaning, now);
        session.cleaning_at = Some(now);

        let later = now + config.stale_cleaning_timeout() + Duration::seconds(1);
        assert_eq!(
            sweep_action(&session, later, &config),
            Some(SweepAction::Terminate(TerminateReason::StaleCleaning))
        );
    }

    #[test]
    fn sweep_cleaning_exempt_from_provider_guard() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let mut session = session_in(SessionState::Cleaning, now);
        session.cleaning_at = Some(now);
        // Provider silent far past its timeout, but cleaning has its own clock.
        session.provider_last_seen = now - Duration::days(1);
        let later = now + Duration::seconds(30);
        assert_eq!(sweep_action(&session, later, &config), None);
    }

    #[test]
    fn sweep_never_touches_terminated() {
        let now = Utc::now();
        let config = LeaseConfig::default();
        let session = session_in(SessionState::Terminated, now);
        let later = now + Duration::days(30);
        assert_eq!(sweep_action(&session, later, &config), None);
    }
}
