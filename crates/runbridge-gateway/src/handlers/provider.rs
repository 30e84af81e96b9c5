//! Provider-facing endpoints: registration, heartbeat, status, cleanup ack.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use runbridge_core::{ProviderId, SessionId};
use runbridge_lease::{LeaseControl, RegisterSessionRequest};
use runbridge_store::SessionState;

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /provider/session`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSessionBody {
    /// The provider's self-assigned id.
    pub provider_id: ProviderId,
    /// Base URL of the provider's notebook runtime.
    pub public_url: String,
    /// Runtime credential embedded in the access redirect.
    pub token: String,
    /// Opaque hardware descriptor.
    #[serde(default)]
    pub hardware: serde_json::Value,
    /// Opaque pricing descriptor.
    #[serde(default)]
    pub pricing: serde_json::Value,
}

/// Response of `POST /provider/session`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSessionResponse {
    /// The new session's id.
    pub session_id: String,
    /// The opaque credential that leases it.
    pub access_token: String,
}

/// Body of `POST /provider/heartbeat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHeartbeatBody {
    /// The session being kept alive.
    pub session_id: SessionId,
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always true.
    pub ok: bool,
}

/// Response of `GET /provider/session/:session_id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    /// The session id.
    pub session_id: String,
    /// Current lifecycle state.
    pub status: SessionState,
    /// True when the provider must wipe renter state and ack.
    pub needs_cleanup: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a session offer.
///
/// The body is validated by hand so malformed payloads yield the documented
/// 400 instead of the extractor's default rejection.
///
/// # Errors
///
/// 400 on missing/invalid fields or a non-https public URL.
pub async fn register_session<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let body: RegisterSessionBody = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;

    let registered = state
        .lease
        .register_session(
            &principal,
            RegisterSessionRequest {
                provider_id: body.provider_id,
                public_url: body.public_url,
                runtime_token: body.token,
                hardware: body.hardware,
                pricing: body.pricing,
            },
        )
        .await?;

    Ok(Json(RegisterSessionResponse {
        session_id: registered.session.session_id.to_string(),
        access_token: registered.access_token.as_str().to_string(),
    }))
}

/// Record a provider heartbeat.
///
/// # Errors
///
/// 404 when the session is unknown or terminated (the provider should
/// register a fresh session).
pub async fn provider_heartbeat<L>(
    State(state): State<Arc<GatewayState<L>>>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let body: ProviderHeartbeatBody = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))?;

    state.lease.provider_heartbeat(&body.session_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Status probe for a session, including `needsCleanup`.
///
/// # Errors
///
/// 404 when the session is unknown.
pub async fn session_status<L>(
    State(state): State<Arc<GatewayState<L>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    let session = state.lease.session_status(&session_id).await?;

    Ok(Json(SessionStatusResponse {
        session_id: session.session_id.to_string(),
        status: session.status,
        needs_cleanup: session.needs_cleanup,
    }))
}

/// Provider acknowledges cleanup: `Cleaning` → `Terminated`.
///
/// # Errors
///
/// 404 unknown session, 409 when the session is not in `Cleaning`.
pub async fn cleanup_ack<L>(
    State(state): State<Arc<GatewayState<L>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    L: LeaseControl + 'static,
{
    let session_id = parse_session_id(&session_id)?;
    state.lease.cleanup_ack(&session_id).await?;
    Ok((StatusCode::OK, Json(OkResponse { ok: true })))
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a session id from a path segment.
fn parse_session_id(s: &str) -> Result<SessionId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {s}")))
}
