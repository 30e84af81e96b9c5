//! Gateway application state.

use std::sync::Arc;

use runbridge_lease::LeaseControl;
use runbridge_tunnel::ChannelRegistry;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// Handlers receive this as `Arc<GatewayState<L>>`; the lease service and
/// the tunnel registry are the two shared singletons every request path
/// touches.
pub struct GatewayState<L>
where
    L: LeaseControl,
{
    /// The lease service for all session lifecycle operations.
    pub lease: Arc<L>,
    /// The live provider control channels.
    pub tunnel: Arc<ChannelRegistry>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<L> GatewayState<L>
where
    L: LeaseControl,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(lease: Arc<L>, tunnel: Arc<ChannelRegistry>, config: GatewayConfig) -> Self {
        Self {
            lease,
            tunnel,
            config,
        }
    }
}
