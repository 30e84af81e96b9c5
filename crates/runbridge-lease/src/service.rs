//! Lease service implementation.
//!
//! This module provides the [`LeaseControl`] trait and the [`LeaseService`]
//! implementation that coordinates the state machine, the access broker, the
//! audit sink, and the teardown hooks. Every transition goes through the
//! store's conditional update so foreground handlers and the supervisor can
//! race safely.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use runbridge_core::{AccessToken, PrincipalId, SessionId};
use runbridge_store::{Session, SessionState, Store, UpdateOutcome};

use crate::audit::{AuditSink, EventKind, LifecycleEvent, TracingAuditSink};
use crate::broker;
use crate::error::{LeaseError, Result};
use crate::hooks::{LeaseHooks, NoopHooks};
use crate::machine::{self, SweepAction};
use crate::types::{
    LeaseConfig, RegisterSessionRequest, RegisteredSession, SessionOffer, SweepReport,
};

/// Trait defining the lease operations.
///
/// This is the complete surface the gateway calls; implementations handle
/// validation, atomic transitions, and audit emission.
#[async_trait]
pub trait LeaseControl: Send + Sync {
    /// Register a new session offer and mint its access token.
    async fn register_session(
        &self,
        principal: &PrincipalId,
        request: RegisterSessionRequest,
    ) -> Result<RegisteredSession>;

    /// Record a provider heartbeat.
    ///
    /// Terminated sessions reject the heartbeat: the provider must register a
    /// fresh session.
    async fn provider_heartbeat(&self, session_id: &SessionId) -> Result<()>;

    /// List sessions visible to a renter: everything `Ready`, plus the
    /// renter's own leases (so a renter can find and reconnect to their own
    /// lease without seeing anyone else's).
    async fn list_for_renter(&self, principal: &PrincipalId) -> Result<Vec<SessionOffer>>;

    /// Resolve a token and take (or re-take) the lease.
    ///
    /// `Ready` sessions lock to any principal; `LockedAbandoned` sessions
    /// only to the principal pinned at lock time. A principal re-accessing
    /// its own `Locked` session refreshes the lease. On success the caller's
    /// principal and IP are pinned.
    async fn access(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<Session>;

    /// Record a renter heartbeat. The caller must match the pinned principal
    /// and IP exactly.
    async fn renter_heartbeat(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<()>;

    /// Release a held lease, moving the session into `Cleaning`.
    async fn release(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<()>;

    /// Status probe for a session, including `needs_cleanup`.
    async fn session_status(&self, session_id: &SessionId) -> Result<Session>;

    /// Provider acknowledges cleanup: `Cleaning` → `Terminated`.
    async fn cleanup_ack(&self, session_id: &SessionId) -> Result<()>;

    /// Run one reconciliation pass over every session.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport>;
}

/// The main lease service implementation.
pub struct LeaseService<S: Store> {
    store: Arc<S>,
    config: LeaseConfig,
    audit: Arc<dyn AuditSink>,
    hooks: Arc<dyn LeaseHooks>,
}

impl<S: Store> LeaseService<S> {
    /// Create a new lease service with the default audit sink and no hooks.
    #[must_use]
    pub fn new(store: Arc<S>, config: LeaseConfig) -> Self {
        Self {
            store,
            config,
            audit: Arc::new(TracingAuditSink),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the teardown hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn LeaseHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &LeaseConfig {
        &self.config
    }

    fn emit(&self, session_id: SessionId, kind: EventKind, metadata: serde_json::Value) {
        self.audit
            .emit(LifecycleEvent::new(session_id, kind, metadata));
    }

    /// Apply one timeout-driven transition, re-deriving the decision under
    /// the store lock so a foreground transition (or a fresh heartbeat)
    /// observed after listing wins the race.
    fn sweep_one(&self, observed: &Session, now: DateTime<Utc>) -> Result<bool> {
        let Some(action) = machine::sweep_action(observed, now, &self.config) else {
            return Ok(false);
        };

        let session_id = observed.session_id;
        let config = &self.config;
        let outcome = self.store.update_session(&session_id, |current| {
            if machine::sweep_action(current, now, config) != Some(action) {
                return None;
            }
            let mut next = current.clone();
            match action {
                SweepAction::MarkAbandoned => {
                    next.status = SessionState::LockedAbandoned;
                    next.abandoned_at = Some(now);
                }
                SweepAction::BeginCleaning => {
                    next.status = SessionState::Cleaning;
                    next.cleaning_at = Some(now);
                    next.needs_cleanup = true;
                    next.clear_lease();
                }
                SweepAction::Terminate(_) => {
                    next.status = SessionState::Terminated;
                    next.terminated_at = Some(now);
                    next.needs_cleanup = false;
                    next.clear_lease();
                }
            }
            debug_assert!(machine::is_valid_transition(current.status, next.status));
            Some(next)
        })?;

        let UpdateOutcome::Applied(_) = outcome else {
            // A foreground transition got there first; the next pass will
            // re-evaluate from the new state.
            return Ok(false);
        };

        match action {
            SweepAction::MarkAbandoned => {
                tracing::info!(session_id = %session_id, "lease abandoned after idle timeout");
                let principal = observed.locked_by.as_ref().map(PrincipalId::as_str);
                self.emit(
                    session_id,
                    EventKind::Abandoned,
                    json!({ "principal": principal }),
                );
            }
            SweepAction::BeginCleaning => {
                tracing::info!(session_id = %session_id, "grace window expired, cleaning");
                self.emit(
                    session_id,
                    EventKind::Cleaning,
                    json!({ "reason": "grace_expired" }),
                );
                self.hooks.lease_ended(&session_id);
            }
            SweepAction::Terminate(reason) => {
                tracing::info!(
                    session_id = %session_id,
                    reason = reason.as_str(),
                    "session terminated by sweep"
                );
                self.emit(
                    session_id,
                    EventKind::Terminated,
                    json!({ "reason": reason.as_str() }),
                );
                self.hooks.session_terminated(&session_id);
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl<S: Store + 'static> LeaseControl for LeaseService<S> {
    async fn register_session(
        &self,
        principal: &PrincipalId,
        request: RegisterSessionRequest,
    ) -> Result<RegisteredSession> {
        if request.public_url.is_empty() {
            return Err(LeaseError::InvalidRegistration(
                "publicUrl must not be empty".to_string(),
            ));
        }
        if self.config.require_https_public_url && !request.public_url.starts_with("https://") {
            tracing::warn!(
                principal = %principal,
                public_url = %request.public_url,
                "rejected registration with non-https public URL"
            );
            return Err(LeaseError::InvalidRegistration(
                "publicUrl must be https".to_string(),
            ));
        }
        if request.runtime_token.is_empty() {
            return Err(LeaseError::InvalidRegistration(
                "token must not be empty".to_string(),
            ));
        }

        let session = Session::new(
            request.provider_id,
            request.public_url,
            request.runtime_token,
            request.hardware,
            request.pricing,
            Utc::now(),
        );
        self.store.put_session(&session)?;
        let access_token = broker::issue_grant(self.store.as_ref(), session.session_id)?;

        tracing::info!(
            session_id = %session.session_id,
            provider_id = %session.provider_id,
            "session registered"
        );
        self.emit(
            session.session_id,
            EventKind::Created,
            json!({ "providerId": session.provider_id.to_string() }),
        );

        Ok(RegisteredSession {
            session,
            access_token,
        })
    }

    async fn provider_heartbeat(&self, session_id: &SessionId) -> Result<()> {
        let now = Utc::now();
        let outcome = self.store.update_session(session_id, |current| {
            if current.status == SessionState::Terminated {
                return None;
            }
            let mut next = current.clone();
            next.provider_last_seen = now;
            Some(next)
        })?;

        match outcome {
            UpdateOutcome::Applied(_) => {
                tracing::debug!(session_id = %session_id, "provider heartbeat");
                Ok(())
            }
            // Terminated sessions look unknown to the provider so it
            // re-registers instead of heartbeating a corpse.
            UpdateOutcome::Rejected(_) | UpdateOutcome::NotFound => {
                Err(LeaseError::SessionNotFound(*session_id))
            }
        }
    }

    async fn list_for_renter(&self, principal: &PrincipalId) -> Result<Vec<SessionOffer>> {
        let sessions = self.store.list_sessions()?;
        let mut offers = Vec::new();

        for session in sessions {
            let visible = session.status == SessionState::Ready || session.is_held_by(principal);
            if !visible {
                continue;
            }
            match self.store.grant_for_session(&session.session_id)? {
                Some(grant) => offers.push(SessionOffer {
                    session,
                    access_token: grant.token,
                }),
                None => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        "session has no live grant, skipping from listing"
                    );
                }
            }
        }

        Ok(offers)
    }

    async fn access(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<Session> {
        let session = broker::resolve_grant(self.store.as_ref(), token)?;
        let session_id = session.session_id;
        let now = Utc::now();
        let mut prior = None;

        let outcome = self.store.update_session(&session_id, |current| {
            prior = Some(current.status);
            match current.status {
                status if machine::can_lease(status) => {
                    let mut next = current.clone();
                    next.status = SessionState::Locked;
                    next.locked_by = Some(principal.clone());
                    next.locked_at = Some(now);
                    next.renter_last_seen = Some(now);
                    next.renter_last_ip = Some(ip);
                    next.abandoned_at = None;
                    Some(next)
                }
                SessionState::Locked | SessionState::LockedAbandoned
                    if current.locked_by.as_ref() == Some(principal) =>
                {
                    let mut next = current.clone();
                    next.status = SessionState::Locked;
                    next.renter_last_seen = Some(now);
                    next.renter_last_ip = Some(ip);
                    next.abandoned_at = None;
                    Some(next)
                }
                _ => None,
            }
        })?;

        match outcome {
            UpdateOutcome::Applied(next) => {
                match prior {
                    Some(SessionState::Ready) => {
                        tracing::info!(
                            session_id = %session_id,
                            principal = %principal,
                            "session locked"
                        );
                        self.emit(
                            session_id,
                            EventKind::Locked,
                            json!({ "principal": principal.as_str(), "ip": ip.to_string() }),
                        );
                    }
                    Some(SessionState::LockedAbandoned) => {
                        tracing::info!(
                            session_id = %session_id,
                            principal = %principal,
                            "abandoned lease reclaimed"
                        );
                        self.emit(
                            session_id,
                            EventKind::Reconnected,
                            json!({ "principal": principal.as_str(), "ip": ip.to_string() }),
                        );
                    }
                    // Refreshing an already-held lock is not an audit event.
                    _ => {}
                }
                Ok(next)
            }
            UpdateOutcome::Rejected(current) => match current.status {
                SessionState::Locked | SessionState::LockedAbandoned => {
                    tracing::warn!(
                        session_id = %session_id,
                        principal = %principal,
                        "access refused: leased by another principal"
                    );
                    Err(LeaseError::LeasedByOther(session_id))
                }
                from => Err(LeaseError::InvalidState {
                    session_id,
                    from,
                    to: SessionState::Locked,
                }),
            },
            UpdateOutcome::NotFound => Err(LeaseError::InvalidToken),
        }
    }

    async fn renter_heartbeat(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<()> {
        let session = broker::resolve_grant(self.store.as_ref(), token)?;
        let session_id = session.session_id;
        let now = Utc::now();

        let outcome = self.store.update_session(&session_id, |current| {
            if machine::is_leased(current.status)
                && current.locked_by.as_ref() == Some(principal)
                && current.renter_last_ip == Some(ip)
            {
                let mut next = current.clone();
                next.renter_last_seen = Some(now);
                Some(next)
            } else {
                None
            }
        })?;

        match outcome {
            UpdateOutcome::Applied(_) => Ok(()),
            UpdateOutcome::Rejected(current) => {
                if machine::is_leased(current.status) {
                    tracing::warn!(
                        session_id = %session_id,
                        principal = %principal,
                        ip = %ip,
                        "heartbeat rejected: pinned principal/IP mismatch"
                    );
                    self.emit(
                        session_id,
                        EventKind::HijackRejected,
                        json!({
                            "principal": principal.as_str(),
                            "ip": ip.to_string(),
                            "call": "heartbeat",
                        }),
                    );
                    Err(LeaseError::OwnerMismatch(session_id))
                } else {
                    Err(LeaseError::NotLeased(session_id))
                }
            }
            UpdateOutcome::NotFound => Err(LeaseError::InvalidToken),
        }
    }

    async fn release(
        &self,
        token: &AccessToken,
        principal: &PrincipalId,
        ip: IpAddr,
    ) -> Result<()> {
        let session = broker::resolve_grant(self.store.as_ref(), token)?;
        let session_id = session.session_id;
        let now = Utc::now();

        let outcome = self.store.update_session(&session_id, |current| {
            if current.status == SessionState::Locked
                && current.locked_by.as_ref() == Some(principal)
                && current.renter_last_ip == Some(ip)
            {
                let mut next = current.clone();
                next.status = SessionState::Cleaning;
                next.cleaning_at = Some(now);
                next.needs_cleanup = true;
                next.clear_lease();
                Some(next)
            } else {
                None
            }
        })?;

        match outcome {
            UpdateOutcome::Applied(_) => {
                tracing::info!(
                    session_id = %session_id,
                    principal = %principal,
                    "lease released, cleaning"
                );
                self.emit(
                    session_id,
                    EventKind::Released,
                    json!({ "principal": principal.as_str(), "reason": "manual_release" }),
                );
                self.hooks.lease_ended(&session_id);
                Ok(())
            }
            UpdateOutcome::Rejected(current) => {
                if machine::is_leased(current.status)
                    && (current.locked_by.as_ref() != Some(principal)
                        || current.renter_last_ip != Some(ip))
                {
                    tracing::warn!(
                        session_id = %session_id,
                        principal = %principal,
                        ip = %ip,
                        "release rejected: pinned principal/IP mismatch"
                    );
                    self.emit(
                        session_id,
                        EventKind::HijackRejected,
                        json!({
                            "principal": principal.as_str(),
                            "ip": ip.to_string(),
                            "call": "release",
                        }),
                    );
                    Err(LeaseError::OwnerMismatch(session_id))
                } else {
                    Err(LeaseError::InvalidState {
                        session_id,
                        from: current.status,
                        to: SessionState::Cleaning,
                    })
                }
            }
            UpdateOutcome::NotFound => Err(LeaseError::InvalidToken),
        }
    }

    async fn session_status(&self, session_id: &SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)?
            .ok_or(LeaseError::SessionNotFound(*session_id))
    }

    async fn cleanup_ack(&self, session_id: &SessionId) -> Result<()> {
        let now = Utc::now();
        let outcome = self.store.update_session(session_id, |current| {
            if current.status == SessionState::Cleaning {
                let mut next = current.clone();
                next.status = SessionState::Terminated;
                next.terminated_at = Some(now);
                next.needs_cleanup = false;
                Some(next)
            } else {
                None
            }
        })?;

        match outcome {
            UpdateOutcome::Applied(_) => {
                tracing::info!(session_id = %session_id, "cleanup acknowledged, terminated");
                self.emit(
                    *session_id,
                    EventKind::Terminated,
                    json!({ "reason": "cleanup_ack" }),
                );
                self.hooks.session_terminated(session_id);
                Ok(())
            }
            UpdateOutcome::Rejected(current) => Err(LeaseError::InvalidState {
                session_id: *session_id,
                from: current.status,
                to: SessionState::Terminated,
            }),
            UpdateOutcome::NotFound => Err(LeaseError::SessionNotFound(*session_id)),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let sessions = self.store.list_sessions()?;
        let mut report = SweepReport {
            examined: sessions.len(),
            ..SweepReport::default()
        };

        for session in &sessions {
            match self.sweep_one(session, now) {
                Ok(true) => report.transitions += 1,
                Ok(false) => {}
                Err(error) => {
                    // One bad session must not starve the rest of the pass.
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = %error,
                        "sweep skipped session"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}
