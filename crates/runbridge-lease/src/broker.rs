//! Access broker: the mapping between opaque tokens and sessions.
//!
//! Thin by design. Issuing replaces any prior token for the session;
//! resolution fails closed for terminated sessions even while the mapping
//! row still exists.

use runbridge_core::{AccessToken, SessionId};
use runbridge_store::{AccessGrant, Session, Store};

use crate::error::{LeaseError, Result};
use crate::machine;

/// Mint a fresh token for a session, invalidating any prior one.
///
/// # Errors
///
/// Returns an error if the store operation fails.
pub fn issue_grant<S: Store>(store: &S, session_id: SessionId) -> Result<AccessToken> {
    let token = AccessToken::generate();
    store.put_grant(&AccessGrant {
        token: token.clone(),
        session_id,
    })?;
    Ok(token)
}

/// Resolve a token to its session.
///
/// # Errors
///
/// Returns `LeaseError::InvalidToken` when the token is unknown, when the
/// session record is gone, or when the session is terminated (fail closed).
pub fn resolve_grant<S: Store>(store: &S, token: &AccessToken) -> Result<Session> {
    let Some(grant) = store.grant_for_token(token)? else {
        return Err(LeaseError::InvalidToken);
    };

    let Some(session) = store.get_session(&grant.session_id)? else {
        return Err(LeaseError::InvalidToken);
    };

    if machine::is_terminal(session.status) {
        return Err(LeaseError::InvalidToken);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use runbridge_core::ProviderId;
    use runbridge_store::{MemoryStore, SessionState};

    fn stored_session(store: &MemoryStore) -> Session {
        let session = Session::new(
            ProviderId::generate(),
            "https://runtime.example".to_string(),
            "tok".to_string(),
            serde_json::Value::Null,
            serde_json::Value::Null,
            Utc::now(),
        );
        store.put_session(&session).unwrap();
        session
    }

    #[test]
    fn issue_then_resolve() {
        let store = MemoryStore::new();
        let session = stored_session(&store);

        let token = issue_grant(&store, session.session_id).unwrap();
        let resolved = resolve_grant(&store, &token).unwrap();
        assert_eq!(resolved.session_id, session.session_id);
    }

    #[test]
    fn reissue_invalidates_prior_token() {
        let store = MemoryStore::new();
        let session = stored_session(&store);

        let first = issue_grant(&store, session.session_id).unwrap();
        let second = issue_grant(&store, session.session_id).unwrap();

        assert!(matches!(
            resolve_grant(&store, &first),
            Err(LeaseError::InvalidToken)
        ));
        assert!(resolve_grant(&store, &second).is_ok());
    }

    #[test]
    fn unknown_token_fails() {
        let store = MemoryStore::new();
        let result = resolve_grant(&store, &AccessToken::generate());
        assert!(matches!(result, Err(LeaseError::InvalidToken)));
    }

    #[test]
    fn terminated_session_fails_closed() {
        let store = MemoryStore::new();
        let mut session = stored_session(&store);
        let token = issue_grant(&store, session.session_id).unwrap();

        session.status = SessionState::Terminated;
        store.put_session(&session).unwrap();

        // The mapping row still exists, but resolution must fail.
        assert!(store.grant_for_token(&token).unwrap().is_some());
        assert!(matches!(
            resolve_grant(&store, &token),
            Err(LeaseError::InvalidToken)
        ));
    }
}
