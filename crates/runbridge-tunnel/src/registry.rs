//! Registry of live control channels, keyed by session.
//!
//! "The session has a control channel" means exactly "this registry has an
//! open entry for it". Registering a replacement channel (a provider
//! reconnect) shuts the old one down first so its pending work completes
//! with errors instead of dangling.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use runbridge_core::SessionId;

use crate::channel::{ControlChannel, Frame};

/// All live provider control channels.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<SessionId, Arc<ControlChannel>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for a session, replacing (and shutting down) any
    /// previous one. Returns the channel and the outbound frame receiver
    /// the caller pumps into the provider socket.
    pub fn register(
        &self,
        session_id: SessionId,
    ) -> (Arc<ControlChannel>, mpsc::UnboundedReceiver<Frame>) {
        let (channel, rx) = ControlChannel::new(session_id);
        if let Some(previous) = self.channels.insert(session_id, Arc::clone(&channel)) {
            tracing::info!(
                session_id = %session_id,
                "provider reconnected, replacing control channel"
            );
            previous.shutdown();
        }
        (channel, rx)
    }

    /// The live channel for a session, if the provider is connected.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<ControlChannel>> {
        self.channels
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a specific channel when its socket closes. A newer channel
    /// registered by a reconnect is left alone.
    pub fn deregister(&self, session_id: &SessionId, channel: &Arc<ControlChannel>) {
        self.channels
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, channel));
        channel.shutdown();
    }

    /// Abort in-flight work for a session's channel, keeping the channel.
    /// Wired to lease-ended transitions.
    pub fn abort_session(&self, session_id: &SessionId) {
        if let Some(channel) = self.get(session_id) {
            channel.abort_inflight();
        }
    }

    /// Shut down and remove a session's channel. Wired to termination.
    pub fn remove(&self, session_id: &SessionId) {
        if let Some((_, channel)) = self.channels.remove(session_id) {
            channel.shutdown();
        }
    }

    /// Number of connected providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no provider is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
