//! Authentication types for hosted-auth tokens and sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience the hosted auth service puts on user access tokens.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// JWT claims carried by hosted-auth access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: Uuid,
    /// User email, if the token carries one.
    #[serde(default)]
    pub email: Option<String>,
    /// Database role the token maps to.
    #[serde(default = "default_role")]
    pub role: String,
    /// Audience.
    pub aud: String,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Expiration timestamp.
    pub exp: i64,
}

fn default_role() -> String {
    AUTHENTICATED_AUDIENCE.to_string()
}

impl Claims {
    /// Creates claims for a user, mainly useful for tests and local tooling.
    #[must_use]
    pub fn new(user_id: Uuid, email: Option<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: user_id,
            email,
            role: default_role(),
            aud: AUTHENTICATED_AUDIENCE.to_string(),
            iat: Some(Utc::now().timestamp()),
            exp: expires_at.timestamp(),
        }
    }

    /// Returns the user ID from claims.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.sub
    }
}

/// Sign-up request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    /// User email.
    pub email: String,
    /// User password.
    pub password: String,
    /// User full name.
    pub full_name: String,
}

/// Login request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// User email.
    pub email: String,
    /// User password.
    pub password: String,
}

/// Refresh token request.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token.
    pub refresh_token: String,
}

/// Password recovery request.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRecoveryRequest {
    /// Email to send the recovery link to.
    pub email: String,
}

/// Session issued by the hosted auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Access token (short-lived).
    pub access_token: String,
    /// Refresh token (long-lived).
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Token type, always `bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// The authenticated user.
    pub user: DirectoryUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// A user record in the hosted auth directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// User ID.
    pub id: Uuid,
    /// Email, absent for phone-only accounts.
    #[serde(default)]
    pub email: Option<String>,
}
