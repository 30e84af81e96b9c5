//! Router configuration.
//!
//! External paths are part of the protocol contract with provider agents and
//! renter clients and are preserved exactly.

use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use runbridge_lease::LeaseControl;

use crate::handlers::{control, health, provider, proxy, renter, stream};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Provider surface
/// - `POST /provider/session` - Register a session (authenticated)
/// - `POST /provider/heartbeat` - Provider liveness
/// - `GET /provider/session/:session_id` - Status probe incl. needsCleanup
/// - `POST /provider/session/:session_id/cleanup_ack` - Finish teardown
/// - `GET /ws/provider/:session_id` - The control channel
///
/// ## Renter surface (authenticated)
/// - `GET /renter/sessions` - List leasable sessions
/// - `GET /access/:access_token` - Take the lease, redirect into the runtime
/// - `POST /renter/heartbeat/:access_token` - Renter liveness
/// - `POST /renter/release/:access_token` - Give the lease back
///
/// ## Tunnel surface (authenticated, lease required)
/// - `ANY /session/:session_id/proxy/*path` - Proxied HTTP call
/// - `GET /session/:session_id/stream/*path` - Proxied WebSocket stream
pub fn create_router<L>(state: GatewayState<L>) -> Router
where
    L: LeaseControl + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Provider surface
        .route("/provider/session", post(provider::register_session::<L>))
        .route(
            "/provider/heartbeat",
            post(provider::provider_heartbeat::<L>),
        )
        .route(
            "/provider/session/:session_id",
            get(provider::session_status::<L>),
        )
        .route(
            "/provider/session/:session_id/cleanup_ack",
            post(provider::cleanup_ack::<L>),
        )
        .route("/ws/provider/:session_id", get(control::control_channel::<L>))
        // Renter surface
        .route("/renter/sessions", get(renter::list_sessions::<L>))
        .route("/access/:access_token", get(renter::access::<L>))
        .route(
            "/renter/heartbeat/:access_token",
            post(renter::renter_heartbeat::<L>),
        )
        .route(
            "/renter/release/:access_token",
            post(renter::release::<L>),
        )
        // Tunnel surface
        .route(
            "/session/:session_id/proxy/*path",
            any(proxy::proxy_http::<L>),
        )
        .route(
            "/session/:session_id/stream/*path",
            get(stream::proxy_stream::<L>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}
