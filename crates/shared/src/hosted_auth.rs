//! HTTP client for the hosted auth service.
//!
//! Sign-up, sign-in, refresh and password recovery use the public anon key.
//! Directory listing uses the service role key and is only called by
//! trusted tooling such as the legacy importer.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::auth::{AuthSession, DirectoryUser};
use crate::error::AppError;
use crate::retry::RetryPolicy;

/// Page size used when walking the user directory.
pub const DIRECTORY_PAGE_SIZE: u32 = 1000;

/// Errors returned by the hosted auth client.
#[derive(Debug, Error)]
pub enum AuthClientError {
    /// Transport failure (connection refused, timeout, TLS).
    #[error("auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// Email/password or refresh token rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Non-success response from the service.
    #[error("auth service returned {status}: {message}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Message extracted from the body.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("unexpected auth response: {0}")]
    Decode(String),

    /// The service role key is required for this call.
    #[error("service role key not configured")]
    MissingServiceKey,
}

impl AuthClientError {
    /// Whether the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<AuthClientError> for AppError {
    fn from(err: AuthClientError) -> Self {
        match err {
            AuthClientError::InvalidCredentials => {
                Self::Unauthorized("Invalid email or password".to_string())
            }
            AuthClientError::Status { status, message }
                if (400..500).contains(&status) && status != 429 =>
            {
                Self::Validation(message)
            }
            other => Self::ExternalService(other.to_string()),
        }
    }
}

/// Outcome of a sign-up: a session when the project auto-confirms emails.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// The created user.
    pub user: DirectoryUser,
    /// Session, absent when email confirmation is pending.
    pub session: Option<AuthSession>,
}

#[derive(Debug, Deserialize)]
struct DirectoryPage {
    users: Vec<DirectoryUser>,
}

/// Client for the hosted auth REST API.
#[derive(Clone)]
pub struct HostedAuthClient {
    http: Client,
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HostedAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAuthClient")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[hidden]")
            .field("service_role_key", &"[hidden]")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HostedAuthClient {
    /// Creates a client for the project at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Enables admin calls with the service role key.
    #[must_use]
    pub fn with_service_role_key(mut self, key: impl Into<String>) -> Self {
        self.service_role_key = Some(key.into());
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.base_url)
    }

    /// Registers a new user.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, AuthClientError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let value: Value = self.post_public("/signup", &body).await?;

        if value.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value(value)
                .map_err(|e| AuthClientError::Decode(e.to_string()))?;
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: DirectoryUser =
            serde_json::from_value(value).map_err(|e| AuthClientError::Decode(e.to_string()))?;
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    /// Exchanges email and password for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthClientError> {
        let body = json!({ "email": email, "password": password });
        self.token_grant("password", &body).await
    }

    /// Exchanges a refresh token for a new session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthClientError> {
        let body = json!({ "refresh_token": refresh_token });
        self.token_grant("refresh_token", &body).await
    }

    /// Sends a password recovery email.
    pub async fn recover_password(&self, email: &str) -> Result<(), AuthClientError> {
        let body = json!({ "email": email });
        let _: Value = self.post_public("/recover", &body).await?;
        Ok(())
    }

    /// Lists one page of the user directory (1-indexed).
    pub async fn list_users_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<DirectoryUser>, AuthClientError> {
        let key = self
            .service_role_key
            .as_deref()
            .ok_or(AuthClientError::MissingServiceKey)?;
        let url = self.endpoint("/admin/users");
        let url = url.as_str();

        let listing: DirectoryPage = self
            .retry
            .run(
                move || async move {
                    let response = self
                        .http
                        .get(url)
                        .query(&[("page", page), ("per_page", per_page)])
                        .header("apikey", key)
                        .bearer_auth(key)
                        .send()
                        .await?;
                    decode_response(response).await
                },
                AuthClientError::is_transient,
            )
            .await?;

        Ok(listing.users)
    }

    /// Walks every page of the user directory.
    pub async fn list_all_users(&self) -> Result<Vec<DirectoryUser>, AuthClientError> {
        let mut users = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.list_users_page(page, DIRECTORY_PAGE_SIZE).await?;
            let len = batch.len();
            users.extend(batch);
            debug!(page, fetched = len, "Fetched auth directory page");
            if len < DIRECTORY_PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }
        Ok(users)
    }

    async fn token_grant(&self, grant: &str, body: &Value) -> Result<AuthSession, AuthClientError> {
        let url = self.endpoint("/token");
        let url = url.as_str();
        self.retry
            .run(
                move || async move {
                    let response = self
                        .http
                        .post(url)
                        .query(&[("grant_type", grant)])
                        .header("apikey", &self.anon_key)
                        .json(body)
                        .send()
                        .await?;
                    if matches!(
                        response.status(),
                        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
                    ) {
                        return Err(AuthClientError::InvalidCredentials);
                    }
                    decode_response(response).await
                },
                AuthClientError::is_transient,
            )
            .await
    }

    async fn post_public<T>(&self, path: &str, body: &Value) -> Result<T, AuthClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path);
        let url = url.as_str();
        self.retry
            .run(
                move || async move {
                    let response = self
                        .http
                        .post(url)
                        .header("apikey", &self.anon_key)
                        .json(body)
                        .send()
                        .await?;
                    decode_response(response).await
                },
                AuthClientError::is_transient,
            )
            .await
    }
}

async fn decode_response<T>(response: reqwest::Response) -> Result<T, AuthClientError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        return serde_json::from_str(text).map_err(|e| AuthClientError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(AuthClientError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pulls a human readable message out of an auth error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
