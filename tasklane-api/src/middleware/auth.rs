//! Axum Middleware for Authentication
//!
//! Validates `Authorization: Bearer <jwt>` on protected routes and injects
//! the [`AuthUser`] into request extensions. Handlers take the
//! [`CurrentUser`] extractor, which fails when the middleware did not run.

use crate::auth::{bearer_token, validate_jwt_token, AuthConfig, AuthUser};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: Arc<AuthConfig>) -> Self {
        Self { auth_config }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Reject requests without a valid bearer token; attach the caller otherwise.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Request without Authorization header");
            ApiError::unauthorized("Access Denied")
        })?;

    let token = bearer_token(header_value)?;
    let claims = validate_jwt_token(&state.auth_config, token).map_err(|e| {
        tracing::warn!(error = %e, "Rejected bearer token");
        e
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The authenticated caller.
///
/// `auth_middleware` must be applied to the route; without it the extractor
/// answers 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Access Denied"))
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = AuthUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
