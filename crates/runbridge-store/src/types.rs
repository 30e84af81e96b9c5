//! Domain types stored by the relay.
//!
//! These types represent the persisted state of compute sessions and the
//! access grants bound to them.

use chrono::{DateTime, Utc};
use runbridge_core::{AccessToken, PrincipalId, ProviderId, SessionId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Lifecycle states for a session.
///
/// `Terminated` is absorbing; a session in `Cleaning` blocks new leases even
/// though no renter holds it, so a fresh lease can never race a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Registered and available for lease.
    Ready,
    /// Exclusively leased to one renter principal.
    Locked,
    /// Leased but the renter has gone silent; only the same principal may
    /// reclaim it within the grace window.
    LockedAbandoned,
    /// Being torn down on the provider side; not leasable.
    Cleaning,
    /// Gone. No transition leaves this state.
    Terminated,
}

/// One compute offer from one provider.
///
/// The live control-channel handle is deliberately not part of this record:
/// connection state lives in the tunnel's channel registry and dies with the
/// connection, while this record is the durable view the lease machinery and
/// the supervisor reconcile against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier, minted at registration.
    pub session_id: SessionId,
    /// The provider offering this session.
    pub provider_id: ProviderId,
    /// Base URL of the provider's notebook runtime, used for the access
    /// redirect.
    pub public_url: String,
    /// Runtime credential embedded in the redirect URL.
    pub runtime_token: String,
    /// Opaque hardware descriptor, passed through to listings.
    pub hardware: serde_json::Value,
    /// Opaque pricing descriptor, passed through to listings.
    pub pricing: serde_json::Value,
    /// Current lifecycle state.
    pub status: SessionState,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last provider heartbeat.
    pub provider_last_seen: DateTime<Utc>,
    /// The renter principal holding the lease, if any.
    pub locked_by: Option<PrincipalId>,
    /// When the current lease was taken.
    pub locked_at: Option<DateTime<Utc>>,
    /// Last renter heartbeat.
    pub renter_last_seen: Option<DateTime<Utc>>,
    /// IP pinned at lock time; heartbeat and release calls must match it.
    pub renter_last_ip: Option<IpAddr>,
    /// When the lease was marked abandoned.
    pub abandoned_at: Option<DateTime<Utc>>,
    /// When cleaning started; drives the stale-cleaning guard.
    pub cleaning_at: Option<DateTime<Utc>>,
    /// Set when the provider must wipe renter state before the session can
    /// terminate.
    pub needs_cleanup: bool,
    /// When the session reached its terminal state.
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a fresh `Ready` session.
    #[must_use]
    pub fn new(
        provider_id: ProviderId,
        public_url: String,
        runtime_token: String,
        hardware: serde_json::Value,
        pricing: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            provider_id,
            public_url,
            runtime_token,
            hardware,
            pricing,
            status: SessionState::Ready,
            created_at: now,
            provider_last_seen: now,
            locked_by: None,
            locked_at: None,
            renter_last_seen: None,
            renter_last_ip: None,
            abandoned_at: None,
            cleaning_at: None,
            needs_cleanup: false,
            terminated_at: None,
        }
    }

    /// True if `principal` currently holds this session's lease.
    #[must_use]
    pub fn is_held_by(&self, principal: &PrincipalId) -> bool {
        matches!(
            self.status,
            SessionState::Locked | SessionState::LockedAbandoned
        ) && self.locked_by.as_ref() == Some(principal)
    }

    /// Clear all renter-side lease fields.
    pub fn clear_lease(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
        self.renter_last_seen = None;
        self.renter_last_ip = None;
        self.abandoned_at = None;
    }
}

/// One opaque token bound to one session.
///
/// A session has exactly one live grant at a time; issuing a new grant
/// invalidates the old token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    /// The opaque credential.
    pub token: AccessToken,
    /// The session it resolves to.
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session::new(
            ProviderId::generate(),
            "https://runtime.example".to_string(),
            "jupytoken".to_string(),
            serde_json::json!({"gpu": "rtx4090"}),
            serde_json::json!({"hourly": 2}),
            Utc::now(),
        )
    }

    #[test]
    fn new_session_is_ready() {
        let session = sample();
        assert_eq!(session.status, SessionState::Ready);
        assert!(session.locked_by.is_none());
        assert!(!session.needs_cleanup);
    }

    #[test]
    fn state_serializes_screaming_snake() {
        let json = serde_json::to_string(&SessionState::LockedAbandoned).unwrap();
        assert_eq!(json, "\"LOCKED_ABANDONED\"");
        let json = serde_json::to_string(&SessionState::Ready).unwrap();
        assert_eq!(json, "\"READY\"");
    }

    #[test]
    fn held_by_checks_principal_and_state() {
        let mut session = sample();
        let renter = PrincipalId::new("renter-1");
        assert!(!session.is_held_by(&renter));

        session.status = SessionState::Locked;
        session.locked_by = Some(renter.clone());
        assert!(session.is_held_by(&renter));
        assert!(!session.is_held_by(&PrincipalId::new("renter-2")));

        session.status = SessionState::Cleaning;
        assert!(!session.is_held_by(&renter));
    }

    #[test]
    fn clear_lease_resets_renter_fields() {
        let mut session = sample();
        session.status = SessionState::Locked;
        session.locked_by = Some(PrincipalId::new("renter-1"));
        session.locked_at = Some(Utc::now());
        session.renter_last_seen = Some(Utc::now());
        session.renter_last_ip = Some("10.0.0.1".parse().unwrap());

        session.clear_lease();
        assert!(session.locked_by.is_none());
        assert!(session.locked_at.is_none());
        assert!(session.renter_last_seen.is_none());
        assert!(session.renter_last_ip.is_none());
    }
}
