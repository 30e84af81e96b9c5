//! Hooks bridging lease transitions into connection teardown.
//!
//! The tunnel owns live connection state and must drop in-flight work when a
//! lease ends or a session terminates, but the lease machinery cannot depend
//! on the tunnel crate. The composition root implements this trait on top of
//! the tunnel's channel registry and injects it here.

use runbridge_core::SessionId;

/// Callbacks fired on lease-ending transitions.
///
/// Both methods default to no-ops so tests and tools that don't carry a
/// tunnel can ignore them.
pub trait LeaseHooks: Send + Sync {
    /// The renter's claim ended (release or grace expiry): in-flight proxied
    /// requests and streams for the session must be completed/closed.
    fn lease_ended(&self, session_id: &SessionId) {
        let _ = session_id;
    }

    /// The session reached its terminal state: the control channel itself
    /// should be torn down.
    fn session_terminated(&self, session_id: &SessionId) {
        let _ = session_id;
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LeaseHooks for NoopHooks {}
