//! Bridge from lease transitions to tunnel teardown.

use std::sync::Arc;

use runbridge_core::SessionId;
use runbridge_lease::LeaseHooks;
use runbridge_tunnel::ChannelRegistry;

/// Lease hooks that tear down tunnel state through the channel registry.
///
/// When a lease ends, in-flight proxied requests and streams for the session
/// are aborted but the provider's channel stays up (the provider may serve a
/// new renter after cleanup). Termination removes the channel entirely.
pub struct TunnelTeardown {
    registry: Arc<ChannelRegistry>,
}

impl TunnelTeardown {
    /// Wrap a registry.
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }
}

impl LeaseHooks for TunnelTeardown {
    fn lease_ended(&self, session_id: &SessionId) {
        self.registry.abort_session(session_id);
    }

    fn session_terminated(&self, session_id: &SessionId) {
        self.registry.remove(session_id);
    }
}
