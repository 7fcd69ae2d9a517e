//! KYC submission rules, review transitions and document URLs.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use meridian_shared::types::{KycVerificationId, UserId};

use super::error::KycError;
use super::types::{
    DocumentSide, KycStatus, KycSubmission, KycVerification, ReviewDecision, ReviewOutcome,
    UploadDocumentRequest,
};
use crate::storage::{PresignedUrl, StorageService, sanitize_filename};

/// Stateless validation of submissions and reviews.
pub struct KycService;

impl KycService {
    /// Storage key prefix for all files of a submission.
    #[must_use]
    pub fn submission_prefix(user_id: UserId, submission_id: KycVerificationId) -> String {
        format!("kyc/{user_id}/{submission_id}/")
    }

    /// Storage key for one document image.
    ///
    /// Format: `kyc/{user_id}/{submission_id}/{side}-{sanitized_filename}`
    #[must_use]
    pub fn document_key(
        user_id: UserId,
        submission_id: KycVerificationId,
        side: DocumentSide,
        filename: &str,
    ) -> String {
        format!(
            "{}{}-{}",
            Self::submission_prefix(user_id, submission_id),
            side.as_str(),
            sanitize_filename(filename)
        )
    }

    /// Checks a submission before it is stored.
    ///
    /// `current` is the status of the user's latest verification, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a verification is pending or approved, a required
    /// image is missing, or a key points outside this submission.
    pub fn validate_submission(
        user_id: UserId,
        submission: &KycSubmission,
        current: Option<KycStatus>,
    ) -> Result<(), KycError> {
        if let Some(status) = current.filter(|s| s.blocks_resubmission()) {
            return Err(KycError::AlreadySubmitted(status));
        }

        let missing = |side| KycError::MissingDocument {
            document_type: submission.document_type,
            side,
        };
        let front = non_blank(submission.front_key.as_deref()).ok_or_else(|| missing(DocumentSide::Front))?;
        let back = non_blank(submission.back_key.as_deref());
        if submission.document_type.requires_back() && back.is_none() {
            return Err(missing(DocumentSide::Back));
        }
        let selfie = non_blank(submission.selfie_key.as_deref());

        let prefix = Self::submission_prefix(user_id, submission.submission_id);
        for key in [Some(front), back, selfie].into_iter().flatten() {
            if !key.starts_with(&prefix) || key.contains("..") {
                return Err(KycError::ForeignKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// Applies a reviewer decision to a submission in `current` status.
    ///
    /// # Errors
    ///
    /// Returns `KycError::NotPending` unless the submission is pending, and
    /// `KycError::RejectionReasonRequired` for a rejection without a reason.
    pub fn review(
        current: KycStatus,
        decision: &ReviewDecision,
        reviewer: UserId,
    ) -> Result<ReviewOutcome, KycError> {
        if current != KycStatus::Pending {
            return Err(KycError::NotPending(current));
        }
        decision.validate()?;

        let (status, rejection_reason) = match decision {
            ReviewDecision::Approve => (KycStatus::Approved, None),
            ReviewDecision::Reject { reason } => {
                (KycStatus::Rejected, Some(reason.trim().to_string()))
            }
        };

        Ok(ReviewOutcome {
            status,
            rejection_reason,
            reviewed_by: reviewer,
            reviewed_at: Utc::now(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Upload URL handed back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentUpload {
    /// Submission the file belongs to.
    pub submission_id: KycVerificationId,
    /// Which image this is.
    pub side: DocumentSide,
    /// Key to pass back on submission.
    pub key: String,
    /// Where to PUT the file.
    #[serde(flatten)]
    pub upload: PresignedUrl,
}

/// Download URL for a reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentLink {
    /// Which image this is.
    pub side: DocumentSide,
    /// Where to GET the file.
    #[serde(flatten)]
    pub download: PresignedUrl,
}

/// Presigned access to KYC documents.
pub struct KycDocuments {
    storage: Arc<StorageService>,
}

impl KycDocuments {
    /// Create a new document service.
    #[must_use]
    pub const fn new(storage: Arc<StorageService>) -> Self {
        Self { storage }
    }

    /// Presigns an upload for one image of a submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too large, has a disallowed type, or
    /// storage fails.
    pub async fn request_upload(
        &self,
        user_id: UserId,
        req: &UploadDocumentRequest,
    ) -> Result<DocumentUpload, KycError> {
        let submission_id = req.submission_id.unwrap_or_default();
        let key = KycService::document_key(user_id, submission_id, req.side, &req.filename);
        let upload = self
            .storage
            .presign_upload(&key, &req.content_type, req.file_size)
            .await?;

        info!(%user_id, %submission_id, side = req.side.as_str(), "Presigned KYC upload");
        Ok(DocumentUpload {
            submission_id,
            side: req.side,
            key,
            upload,
        })
    }

    /// Confirms every referenced image was actually uploaded.
    ///
    /// # Errors
    ///
    /// Returns `KycError::Storage` with `NotFound` for a missing object.
    pub async fn verify_uploaded(&self, submission: &KycSubmission) -> Result<(), KycError> {
        let keys = [
            &submission.front_key,
            &submission.back_key,
            &submission.selfie_key,
        ];
        for key in keys.into_iter().flatten() {
            self.storage.verify_upload(key.trim()).await?;
        }
        Ok(())
    }

    /// Presigned download links for a reviewer.
    ///
    /// # Errors
    ///
    /// Returns an error if presigning fails.
    pub async fn download_links(
        &self,
        verification: &KycVerification,
    ) -> Result<Vec<DocumentLink>, KycError> {
        let mut links = Vec::new();
        for (side, key) in verification.documents() {
            let download = self.storage.presign_download(key).await?;
            links.push(DocumentLink { side, download });
        }
        Ok(links)
    }
}
