//! Authentication middleware and caller extractors.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;
use meridian_core::access::{AccessScope, Admin};
use meridian_shared::types::UserId;
use meridian_shared::{AppError, Claims, JwtError};

/// Message returned to authenticated callers without an admin-side role.
pub const ADMIN_REQUIRED_MESSAGE: &str = "Admin access required";

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Authentication middleware that validates hosted-auth access tokens.
///
/// Valid claims are stored in request extensions for the extractors below.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = auth_header.and_then(extract_bearer_token) else {
        return ApiError(AppError::Unauthorized(
            "Authorization header with Bearer token is required".into(),
        ))
        .into_response();
    };

    match state.jwt_service.validate_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "Rejected access token");
            let message = match e {
                JwtError::Expired => "Token has expired",
                _ => "Invalid or malformed token",
            };
            ApiError(AppError::Unauthorized(message.into())).into_response()
        }
    }
}

/// Extractor for the authenticated caller's claims.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the user ID from the claims.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        UserId::from_uuid(self.0.user_id())
    }

    /// Returns the email carried by the token, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.0.email.as_deref()
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError(AppError::Unauthorized("Authentication required".into())))
    }
}

/// Admin-side caller with their accessible set, resolved fresh for this
/// request from the stored role flags and assignments.
#[derive(Debug, Clone, Serialize)]
pub struct AdminContext {
    /// Verified identity.
    pub admin: Admin,
    /// Users the caller may act on.
    pub scope: AccessScope,
}

impl AdminContext {
    /// Caller ID.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.admin.id
    }

    /// Checks that `target` is in the caller's accessible set.
    ///
    /// # Errors
    ///
    /// Returns the permission-denied error otherwise.
    pub fn ensure_permits(&self, target: UserId) -> Result<(), ApiError> {
        self.scope.ensure_permits(target).map_err(ApiError::from)
    }
}

impl FromRequestParts<AppState> for AdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        match state.access.resolve_for(user.user_id()).await? {
            Some((admin, scope)) if scope != AccessScope::Nothing => Ok(Self { admin, scope }),
            _ => Err(ApiError(AppError::Forbidden(ADMIN_REQUIRED_MESSAGE.into()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}
