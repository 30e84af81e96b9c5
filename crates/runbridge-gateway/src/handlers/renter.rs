//! Renter-facing endpoints: listing, access, heartbeat, release.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use runbridge_core::AccessToken;
use runbridge_lease::{LeaseControl, SessionOffer};
use runbridge_store::SessionState;

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::handlers::provider::OkResponse;
use crate::state::GatewayState;

// =============================================================================
// Response Types
// =============================================================================

/// One entry in `GET /renter/sessions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOfferResponse {
    /// The session id.
    pub session_id: String,
    /// The token that leases it.
    pub access_token: String,
    /// The provider offering it.
    pub provider_id: String,
    /// Current lifecycle state (`READY`, or the caller's own lease states).
    pub status: SessionState,
    /// Opaque hardware descriptor.
    pub hardware: serde_json::Value,
    /// Opaque pricing descriptor.
    pub pricing: serde_json::Value,
}

impl From<SessionOffer> for SessionOfferResponse {
    fn from(offer: SessionOffer) -> Self {
        Self {
            session_id: offer.session.session_id.to_string(),
            access_token: offer.access_token.as_str().to_string(),
            provider_id: offer.session.provider_id.to_string(),
            status: offer.session.status,
            hardware: offer.session.hardware,
            pricing: offer.session.pricing,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List sessions visible to the caller: everything `READY` plus the caller's
/// own `LOCKED`/`LOCKED_ABANDONED` leases.
///
/// # Errors
///
/// 401 without a principal.
pub async fn list_sessions<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let offers = state.lease.list_for_renter(&principal).await?;
    let response: Vec<SessionOfferResponse> =
        offers.into_iter().map(SessionOfferResponse::from).collect();
    Ok(Json(response))
}

/// Resolve a token, take the lease, and redirect into the runtime.
///
/// On success this 302-redirects to the provider's runtime URL with the
/// runtime token embedded.
///
/// # Errors
///
/// 403 invalid token, 409 locked by another principal or not leasable.
pub async fn access<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(access_token): Path<String>,
) -> Result<Response<Body>, ApiError>
where
    L: LeaseControl + 'static,
{
    let token = AccessToken::from(access_token);
    let session = state.lease.access(&token, &principal, addr.ip()).await?;

    let redirect = format!(
        "{}/lab?token={}",
        session.public_url.trim_end_matches('/'),
        session.runtime_token
    );
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, redirect)
        .body(Body::empty())
        .map_err(|_| ApiError::Internal)
}

/// Record a renter heartbeat.
///
/// # Errors
///
/// 403 when the caller's principal or IP does not match the values pinned at
/// lock time.
pub async fn renter_heartbeat<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(access_token): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let token = AccessToken::from(access_token);
    state
        .lease
        .renter_heartbeat(&token, &principal, addr.ip())
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Release a held lease.
///
/// # Errors
///
/// 403 when the caller is not the pinned owner.
pub async fn release<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(access_token): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let token = AccessToken::from(access_token);
    state
        .lease
        .release(&token, &principal, addr.ip())
        .await?;
    Ok(Json(OkResponse { ok: true }))
}
