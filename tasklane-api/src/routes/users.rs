//! Account REST API Routes
//!
//! Registration, login and account activation. None of these require a
//! bearer token.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tasklane_core::{Activity, Credentials, NewUser, UserError};
use tasklane_storage::UserStore;

use super::tasks::{json_body, record_activity};
use crate::{
    auth::{
        generate_activation_token, generate_jwt_token, token_digest, AuthConfig,
        CredentialHasher,
    },
    error::{ApiError, ApiResult},
    types::{LoginResponse, MessageResponse},
};

/// POST /register - Create an inactive account.
pub async fn register(
    State(users): State<Arc<dyn UserStore>>,
    State(hasher): State<Arc<dyn CredentialHasher>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let creds = json_body(body)?;
    let errors = creds.validate_registration();
    if !errors.is_empty() {
        return Err(UserError::Validation(errors).into());
    }

    let new_user = NewUser {
        email: creds.normalized_email(),
        password_hash: hasher.hash(&creds.passw)?,
        activation_token: generate_activation_token(),
    };
    let user = users.insert_user(&new_user).await?;
    tracing::info!(user_id = %user.id, "Account registered, activation pending");
    record_activity(users.as_ref(), user.id, Activity::Registered).await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::ok("Registration Successfully")),
    ))
}

/// POST /login - Exchange credentials for a bearer token.
///
/// The token is returned both in the `Authorization` response header and
/// in the body. Only its digest is stored.
pub async fn login(
    State(users): State<Arc<dyn UserStore>>,
    State(hasher): State<Arc<dyn CredentialHasher>>,
    State(auth): State<Arc<AuthConfig>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let creds = json_body(body)?;
    let errors = creds.validate_login();
    if !errors.is_empty() {
        return Err(UserError::Validation(errors).into());
    }

    let user = users
        .find_user_by_email(&creds.normalized_email())
        .await?
        .filter(|u| hasher.verify(&u.password_hash, &creds.passw))
        .ok_or(UserError::InvalidCredentials)?;
    if !user.active {
        return Err(UserError::AccountInactive.into());
    }

    let token = generate_jwt_token(&auth, user.id, &user.email)?;
    users.record_session(user.id, &token_digest(&token)).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    record_activity(users.as_ref(), user.id, Activity::LoggedIn).await;

    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ApiError::internal_error(format!("Invalid token header: {e}")))?;

    Ok((
        [(header::AUTHORIZATION, bearer)],
        Json(LoginResponse {
            status: true,
            message: "Login Successfull".to_string(),
            token,
        }),
    ))
}

/// GET /activation_token/:token - Activate the account holding `token`.
pub async fn activate(
    State(users): State<Arc<dyn UserStore>>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = users
        .activate_user(token.trim())
        .await?
        .ok_or(UserError::UnknownActivationToken)?;
    tracing::info!(user_id = %user_id, "Account activated");
    record_activity(users.as_ref(), user_id, Activity::AccountActivated).await;

    Ok(Json(MessageResponse::ok("Account Activated Successfully")))
}
