//! Principal extraction.
//!
//! Identity is an external collaborator: an upstream layer authenticates
//! every renter-facing call and the relay only ever sees an opaque principal
//! id. This extractor pulls that id out of the `Authorization: Bearer`
//! value; comparing two principals for equality is the only thing the relay
//! does with it.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use runbridge_core::PrincipalId;
use runbridge_lease::LeaseControl;

use crate::error::ApiError;
use crate::state::GatewayState;

/// The authenticated principal making a request.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub PrincipalId);

#[axum::async_trait]
impl<L> FromRequestParts<Arc<GatewayState<L>>> for AuthPrincipal
where
    L: LeaseControl + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<GatewayState<L>>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let principal = auth_header
            .strip_prefix("Bearer ")
            .filter(|p| !p.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self(PrincipalId::new(principal)))
    }
}
