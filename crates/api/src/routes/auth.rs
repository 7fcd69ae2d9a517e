//! Authentication routes backed by the hosted auth service.
//!
//! Credentials never touch this service's database; sign-up additionally
//! creates the local `users` row and zero balances.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;
use crate::error::ApiResult;
use meridian_db::{UserProfile, UserRepository};
use meridian_shared::AppError;
use meridian_shared::auth::{
    AuthSession, LoginRequest, PasswordRecoveryRequest, RefreshRequest, SignUpRequest,
};
use meridian_shared::types::UserId;

/// Minimum password length accepted by the hosted service.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Creates the auth router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/password/recover", post(recover_password))
}

/// Sign-up response.
#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    /// The local profile.
    pub user: UserProfile,
    /// Session, absent while email confirmation is pending.
    pub session: Option<AuthSession>,
}

fn validate_signup(req: &SignUpRequest) -> Result<(), AppError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if req.full_name.trim().is_empty() {
        return Err(AppError::Validation("Full name is required".into()));
    }
    Ok(())
}

/// POST /auth/signup - Register with the hosted service and create the local profile.
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<SignUpResponse>)> {
    validate_signup(&payload)?;
    let email = payload.email.trim().to_lowercase();
    let full_name = payload.full_name.trim();

    let outcome = state
        .auth_client
        .sign_up(&email, &payload.password, full_name)
        .await?;

    let user_id = UserId::from_uuid(outcome.user.id);
    let user = UserRepository::new(state.conn())
        .register(user_id, &email, Some(full_name))
        .await?;

    info!(%user_id, "User signed up");
    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            user,
            session: outcome.session,
        }),
    ))
}

/// POST /auth/login - Exchange email and password for a session.
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthSession>> {
    let session = state
        .auth_client
        .sign_in(payload.email.trim(), &payload.password)
        .await?;
    info!(user_id = %session.user.id, "User logged in");
    Ok(Json(session))
}

/// POST /auth/refresh - Exchange a refresh token for a new session.
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<AuthSession>> {
    let session = state.auth_client.refresh(&payload.refresh_token).await?;
    Ok(Json(session))
}

/// POST /auth/password/recover - Send a recovery email.
///
/// Answers the same way whether or not the account exists.
async fn recover_password(
    State(state): State<AppState>,
    Json(payload): Json<PasswordRecoveryRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let email = payload.email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()).into());
    }
    state.auth_client.recover_password(email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If the account exists, a recovery email has been sent"
        })),
    ))
}
