//! In-memory storage engine.
//!
//! The reference [`Store`] implementation: all records live in process-local
//! maps behind one `parking_lot::RwLock`, which is what makes the
//! conditional-update contract trivially atomic — the decision closure runs
//! while the write lock is held.

use std::collections::HashMap;

use parking_lot::RwLock;
use runbridge_core::{AccessToken, SessionId};

use crate::error::{Result, StoreError};
use crate::types::{AccessGrant, Session};
use crate::{Store, UpdateOutcome};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    grants_by_token: HashMap<AccessToken, AccessGrant>,
    token_by_session: HashMap<SessionId, AccessToken>,
}

/// Process-local store backed by hash maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Session Operations
    // =========================================================================

    fn put_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write();
        inner.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let inner = self.inner.read();
        Ok(inner.sessions.get(session_id).cloned())
    }

    fn list_sessions(&self) -> Result<Vec<Session>> {
        let inner = self.inner.read();
        Ok(inner.sessions.values().cloned().collect())
    }

    fn remove_session(&self, session_id: &SessionId) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn update_session<F>(&self, session_id: &SessionId, decide: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Session) -> Option<Session>,
    {
        let mut inner = self.inner.write();
        let Some(current) = inner.sessions.get(session_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        match decide(current) {
            Some(next) => {
                inner.sessions.insert(*session_id, next.clone());
                Ok(UpdateOutcome::Applied(next))
            }
            None => Ok(UpdateOutcome::Rejected(current.clone())),
        }
    }

    // =========================================================================
    // Grant Operations
    // =========================================================================

    fn put_grant(&self, grant: &AccessGrant) -> Result<()> {
        let mut inner = self.inner.write();
        // One live grant per session: drop the token it replaces.
        if let Some(old_token) = inner.token_by_session.remove(&grant.session_id) {
            inner.grants_by_token.remove(&old_token);
        }
        inner
            .token_by_session
            .insert(grant.session_id, grant.token.clone());
        inner
            .grants_by_token
            .insert(grant.token.clone(), grant.clone());
        Ok(())
    }

    fn grant_for_token(&self, token: &AccessToken) -> Result<Option<AccessGrant>> {
        let inner = self.inner.read();
        Ok(inner.grants_by_token.get(token).cloned())
    }

    fn grant_for_session(&self, session_id: &SessionId) -> Result<Option<AccessGrant>> {
        let inner = self.inner.read();
        let token = inner.token_by_session.get(session_id);
        Ok(token.and_then(|t| inner.grants_by_token.get(t).cloned()))
    }

    fn remove_grant(&self, token: &AccessToken) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(grant) = inner.grants_by_token.remove(token) {
            inner.token_by_session.remove(&grant.session_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionState;
    use chrono::Utc;
    use runbridge_core::{PrincipalId, ProviderId};
    use std::sync::Arc;

    fn sample() -> Session {
        Session::new(
            ProviderId::generate(),
            "https://runtime.example".to_string(),
            "tok".to_string(),
            serde_json::Value::Null,
            serde_json::Value::Null,
            Utc::now(),
        )
    }

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryStore::new();
        let session = sample();
        store.put_session(&session).unwrap();

        let fetched = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(fetched.session_id, session.session_id);
        assert_eq!(fetched.status, SessionState::Ready);
    }

    #[test]
    fn update_unknown_session() {
        let store = MemoryStore::new();
        let outcome = store
            .update_session(&SessionId::generate(), |s| Some(s.clone()))
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::NotFound));
    }

    #[test]
    fn update_rejected_returns_current() {
        let store = MemoryStore::new();
        let session = sample();
        store.put_session(&session).unwrap();

        let outcome = store
            .update_session(&session.session_id, |_| None)
            .unwrap();
        match outcome {
            UpdateOutcome::Rejected(current) => {
                assert_eq!(current.status, SessionState::Ready);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_lock_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let session = sample();
        store.put_session(&session).unwrap();
        let session_id = session.session_id;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let principal = PrincipalId::new(format!("renter-{i}"));
                let outcome = store
                    .update_session(&session_id, |current| {
                        if current.status == SessionState::Ready {
                            let mut next = current.clone();
                            next.status = SessionState::Locked;
                            next.locked_by = Some(principal.clone());
                            Some(next)
                        } else {
                            None
                        }
                    })
                    .unwrap();
                matches!(outcome, UpdateOutcome::Applied(_))
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(wins, 1);

        let locked = store.get_session(&session_id).unwrap().unwrap();
        assert_eq!(locked.status, SessionState::Locked);
        assert!(locked.locked_by.is_some());
    }

    #[test]
    fn grant_replacement_invalidates_old_token() {
        let store = MemoryStore::new();
        let session = sample();
        store.put_session(&session).unwrap();

        let first = AccessGrant {
            token: AccessToken::generate(),
            session_id: session.session_id,
        };
        let second = AccessGrant {
            token: AccessToken::generate(),
            session_id: session.session_id,
        };

        store.put_grant(&first).unwrap();
        store.put_grant(&second).unwrap();

        assert!(store.grant_for_token(&first.token).unwrap().is_none());
        let live = store.grant_for_token(&second.token).unwrap().unwrap();
        assert_eq!(live.session_id, session.session_id);
        let by_session = store
            .grant_for_session(&session.session_id)
            .unwrap()
            .unwrap();
        assert_eq!(by_session.token, second.token);
    }

    #[test]
    fn remove_grant_clears_both_indexes() {
        let store = MemoryStore::new();
        let session = sample();
        store.put_session(&session).unwrap();

        let grant = AccessGrant {
            token: AccessToken::generate(),
            session_id: session.session_id,
        };
        store.put_grant(&grant).unwrap();
        store.remove_grant(&grant.token).unwrap();

        assert!(store.grant_for_token(&grant.token).unwrap().is_none());
        assert!(store
            .grant_for_session(&session.session_id)
            .unwrap()
            .is_none());
    }
}
