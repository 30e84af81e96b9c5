//! API error types and responses.
//!
//! This module defines the standard error format for all API responses and
//! the mapping from internal failures onto the HTTP taxonomy: validation
//! → 400, authorization → 403, not-found → 404, conflict → 409,
//! transient-upstream → 502/503/504, internal → 500 (logged, masked).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use runbridge_lease::LeaseError;
use runbridge_tunnel::TunnelError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid authentication.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller may not touch this resource.
    #[error("{0}")]
    Forbidden(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The provider side failed mid-flight.
    #[error("{0}")]
    BadGateway(String),

    /// The session's provider is not connected or not leased to the caller.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// The provider did not answer in time.
    #[error("{0}")]
    GatewayTimeout(String),

    /// Internal server error.
    #[error("internal error")]
    Internal,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::BadGateway(_) => "bad_gateway",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LeaseError> for ApiError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::SessionNotFound(id) => Self::NotFound(format!("session {id}")),
            LeaseError::InvalidToken => {
                Self::Forbidden("invalid or expired access token".to_string())
            }
            LeaseError::OwnerMismatch(_) => Self::Forbidden("access denied".to_string()),
            LeaseError::LeasedByOther(_) => {
                Self::Conflict("session already in use".to_string())
            }
            LeaseError::NotLeased(_) => {
                Self::Conflict("session is not currently leased".to_string())
            }
            LeaseError::InvalidState { from, to, .. } => {
                Self::Conflict(format!("cannot transition from {from:?} to {to:?}"))
            }
            LeaseError::InvalidRegistration(msg) => Self::BadRequest(msg),
            LeaseError::Store(store_err) => {
                tracing::error!(error = %store_err, "store error");
                Self::Internal
            }
            LeaseError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                Self::Internal
            }
        }
    }
}

impl From<TunnelError> for ApiError {
    fn from(err: TunnelError) -> Self {
        match err {
            TunnelError::ChannelAbsent => {
                Self::ServiceUnavailable("provider not connected".to_string())
            }
            TunnelError::Timeout => {
                Self::GatewayTimeout("provider did not respond in time".to_string())
            }
            TunnelError::ChannelClosed
            | TunnelError::StreamNotFound(_)
            | TunnelError::Protocol(_) => {
                Self::BadGateway("provider connection lost".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbridge_core::SessionId;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn lease_errors_map_to_taxonomy() {
        let id = SessionId::generate();
        assert_eq!(
            ApiError::from(LeaseError::InvalidToken).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(LeaseError::LeasedByOther(id)).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(LeaseError::SessionNotFound(id)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(LeaseError::InvalidRegistration("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn tunnel_errors_are_transient_upstream() {
        assert_eq!(
            ApiError::from(TunnelError::ChannelAbsent).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(TunnelError::ChannelClosed).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(TunnelError::Timeout).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn internal_error_is_masked() {
        let err = ApiError::from(LeaseError::Internal("secret detail".into()));
        assert_eq!(err.to_string(), "internal error");
    }
}
