//! Access control error types.

use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::UserId;

/// Errors raised while loading identities or checking scope.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The user directory could not be queried.
    #[error("directory lookup failed: {0}")]
    Directory(String),

    /// The target user is outside the caller's accessible set.
    #[error("user {0} is outside the caller's scope")]
    Denied(UserId),
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Directory(msg) => Self::Database(msg),
            AccessError::Denied(_) => Self::permission_denied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_maps_to_permission_message() {
        let err: AppError = AccessError::Denied(UserId::new()).into();
        assert_eq!(err.status_code(), 403);
        assert!(err.to_string().contains("You don't have permission"));
    }

    #[test]
    fn test_directory_failure_is_backend_error() {
        let err: AppError = AccessError::Directory("connection reset".into()).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
