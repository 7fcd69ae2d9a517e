//! KYC error types.

use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::KycVerificationId;

use super::types::{DocumentSide, DocumentType, KycStatus};
use crate::storage::StorageError;

/// Errors that can occur during KYC submission and review.
#[derive(Debug, Error)]
pub enum KycError {
    /// A required document image is missing.
    #[error("{side:?} image is required for {document_type:?}")]
    MissingDocument {
        /// Document type being submitted.
        document_type: DocumentType,
        /// Missing side.
        side: DocumentSide,
    },

    /// A storage key does not belong to this user's submission.
    #[error("document key {0} does not belong to this submission")]
    ForeignKey(String),

    /// A verification is already pending or approved.
    #[error("a verification is already {}", .0.as_str())]
    AlreadySubmitted(KycStatus),

    /// Only pending submissions can be reviewed.
    #[error("cannot review a submission that is {}", .0.as_str())]
    NotPending(KycStatus),

    /// Rejection needs a reason.
    #[error("rejection reason is required")]
    RejectionReasonRequired,

    /// Submission does not exist or is not visible.
    #[error("verification {0} not found")]
    NotFound(KycVerificationId),

    /// Unrecognized enum value read from storage.
    #[error("unknown KYC value: {0}")]
    UnknownValue(String),

    /// Object storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<KycError> for AppError {
    fn from(err: KycError) -> Self {
        match err {
            KycError::MissingDocument { .. }
            | KycError::ForeignKey(_)
            | KycError::RejectionReasonRequired => Self::Validation(err.to_string()),
            KycError::AlreadySubmitted(_) | KycError::NotPending(_) => {
                Self::Conflict(err.to_string())
            }
            KycError::NotFound(_) => Self::NotFound(err.to_string()),
            KycError::UnknownValue(_) => Self::Internal(err.to_string()),
            KycError::Storage(e) => e.into(),
            KycError::Database(msg) => Self::Database(msg),
        }
    }
}
