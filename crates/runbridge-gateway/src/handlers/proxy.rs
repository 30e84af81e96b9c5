//! Request-channel tunnel: proxied HTTP calls.
//!
//! Any method under `/session/:session_id/proxy/*path` is forwarded over
//! the session's control channel and the provider's answer is returned to
//! the original caller. Calls against a session that is not leased to the
//! caller, or whose provider is not connected, fail immediately — nothing is
//! queued.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};

use runbridge_core::SessionId;
use runbridge_lease::LeaseControl;
use runbridge_store::SessionState;
use runbridge_tunnel::{ProxiedRequest, TunnelError};

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Headers that must not cross the tunnel in either direction. The caller's
/// bearer credential stays on the relay side.
fn skip_header(name: &str) -> bool {
    matches!(
        name,
        "host"
            | "connection"
            | "content-length"
            | "transfer-encoding"
            | "upgrade"
            | "keep-alive"
            | "te"
            | "trailer"
            | "authorization"
            | "proxy-authorization"
    )
}

fn forwarded_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !skip_header(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Forward one HTTP call to the session's provider.
///
/// # Errors
///
/// 503 when the session is not leased to the caller or the provider channel
/// is absent; 502/504 when the provider fails or stalls mid-flight.
pub async fn proxy_http<L>(
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((session_id, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Body>, ApiError>
where
    L: LeaseControl + 'static,
{
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {session_id}")))?;

    let session = state.lease.session_status(&session_id).await?;
    if session.status != SessionState::Locked || session.locked_by.as_ref() != Some(&principal) {
        return Err(ApiError::ServiceUnavailable(
            "session is not leased to the caller".to_string(),
        ));
    }

    let channel = state
        .tunnel
        .get(&session_id)
        .ok_or(TunnelError::ChannelAbsent)?;

    let target_path = match uri.query() {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    };

    let request = ProxiedRequest {
        method: method.to_string(),
        path: target_path,
        headers: forwarded_headers(&headers),
        body: (!body.is_empty()).then(|| body.to_vec()),
    };

    let response = channel
        .proxy_request(request, state.config.proxy_timeout())
        .await?;

    let status = StatusCode::from_u16(response.status)
        .map_err(|_| ApiError::BadGateway("invalid status from provider".to_string()))?;
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if !skip_header(&name.to_ascii_lowercase()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(Body::from(response.body))
        .map_err(|_| ApiError::BadGateway("invalid response from provider".to_string()))
}
