//! Runbridge Gateway - the session relay service.
//!
//! One process serves the whole relay: the lease endpoints, the provider
//! control channels, the tunnel surface, and the reconciliation supervisor
//! all run here against one in-process session store.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runbridge_gateway::{create_router, GatewayConfig, GatewayState, TunnelTeardown};
use runbridge_lease::{supervisor, LeaseConfig, LeaseService};
use runbridge_store::MemoryStore;
use runbridge_tunnel::ChannelRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,runbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Runbridge Gateway");

    // Load configuration from environment
    let mut gateway_config = GatewayConfig::default();
    if let Ok(listen_addr) = std::env::var("LISTEN_ADDR") {
        gateway_config.listen_addr = listen_addr;
    }
    let lease_config = LeaseConfig::default();

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        sweep_interval_seconds = lease_config.sweep_interval_seconds,
        idle_timeout_seconds = lease_config.idle_timeout_seconds,
        "Gateway configuration loaded"
    );

    // Shared state: store, tunnel registry, lease service wired together.
    let store = Arc::new(MemoryStore::new());
    let tunnel = Arc::new(ChannelRegistry::new());
    let sweep_interval = lease_config.sweep_interval();
    let lease = Arc::new(
        LeaseService::new(store, lease_config)
            .with_hooks(Arc::new(TunnelTeardown::new(Arc::clone(&tunnel)))),
    );

    // Reconciliation supervisor
    let supervisor_handle = supervisor::spawn(Arc::clone(&lease), sweep_interval);
    tracing::info!("Reconciliation supervisor started");

    // Router
    let state = GatewayState::new(lease, tunnel, gateway_config.clone());
    let app = create_router(state);

    // Start HTTP server. Connection info feeds the renter IP pinning.
    tracing::info!(listen_addr = %gateway_config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&gateway_config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    supervisor_handle.abort();
    Ok(())
}
