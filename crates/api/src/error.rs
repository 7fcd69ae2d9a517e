//! JSON error envelope for handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use meridian_shared::AppError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable error code, e.g. `FORBIDDEN`.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
}

/// HTTP wrapper around `AppError`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl<E> From<E> for ApiError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if err.is_client_facing() {
            match &err {
                AppError::Unauthorized(m)
                | AppError::Forbidden(m)
                | AppError::NotFound(m)
                | AppError::Validation(m)
                | AppError::BusinessRule(m)
                | AppError::Conflict(m) => m.clone(),
                _ => err.to_string(),
            }
        } else {
            tracing::error!(error = %err, "Request failed");
            "An internal error occurred".to_string()
        };

        let body = ErrorResponse {
            error: err.error_code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Standard handler result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_permission_denied_body() {
        let (status, body) = body_json(ApiError(AppError::permission_denied())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "FORBIDDEN");
        assert_eq!(body["message"], "You don't have permission to act on this user");
    }

    #[tokio::test]
    async fn test_backend_errors_are_masked() {
        let (status, body) =
            body_json(ApiError(AppError::Database("relation users does not exist".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "DATABASE_ERROR");
        assert_eq!(body["message"], "An internal error occurred");
    }
}
