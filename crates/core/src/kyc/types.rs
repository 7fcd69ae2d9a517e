//! KYC domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meridian_shared::types::{KycVerificationId, UserId};

use super::error::KycError;

/// Identity document accepted for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Passport (photo page only).
    Passport,
    /// National identity card.
    NationalId,
    /// Driver's license.
    DriversLicense,
    /// Utility bill or bank statement.
    ProofOfAddress,
}

impl DocumentType {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passport => "passport",
            Self::NationalId => "national_id",
            Self::DriversLicense => "drivers_license",
            Self::ProofOfAddress => "proof_of_address",
        }
    }

    /// Cards have two printed sides.
    #[must_use]
    pub const fn requires_back(self) -> bool {
        matches!(self, Self::NationalId | Self::DriversLicense)
    }
}

impl std::str::FromStr for DocumentType {
    type Err = KycError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passport" => Ok(Self::Passport),
            "national_id" => Ok(Self::NationalId),
            "drivers_license" => Ok(Self::DriversLicense),
            "proof_of_address" => Ok(Self::ProofOfAddress),
            other => Err(KycError::UnknownValue(other.to_string())),
        }
    }
}

/// Which image of a submission a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSide {
    /// Front of the document.
    Front,
    /// Back of the document.
    Back,
    /// Selfie holding the document.
    Selfie,
}

impl DocumentSide {
    /// Prefix used in storage keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Selfie => "selfie",
        }
    }
}

/// Verification status, shared by `kyc_verifications.status` and `users.kyc_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    /// Nothing submitted yet. Only appears on `users`.
    NotSubmitted,
    /// Awaiting review.
    Pending,
    /// Verified.
    Approved,
    /// Rejected; the user may resubmit.
    Rejected,
}

impl KycStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSubmitted => "not_submitted",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether a new submission is blocked.
    #[must_use]
    pub const fn blocks_resubmission(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::str::FromStr for KycStatus {
    type Err = KycError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_submitted" => Ok(Self::NotSubmitted),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(KycError::UnknownValue(other.to_string())),
        }
    }
}

/// Client request for a document upload URL.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDocumentRequest {
    /// Submission the file belongs to; a new one is started when absent.
    #[serde(default)]
    pub submission_id: Option<KycVerificationId>,
    /// Which image this is.
    pub side: DocumentSide,
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub file_size: u64,
}

/// A submission after all files have been uploaded.
#[derive(Debug, Clone, Deserialize)]
pub struct KycSubmission {
    /// ID returned by the upload step.
    pub submission_id: KycVerificationId,
    /// Document type.
    pub document_type: DocumentType,
    /// Storage key of the front image.
    #[serde(default)]
    pub front_key: Option<String>,
    /// Storage key of the back image.
    #[serde(default)]
    pub back_key: Option<String>,
    /// Storage key of the selfie.
    #[serde(default)]
    pub selfie_key: Option<String>,
}

/// Reviewer decision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Approve the submission.
    Approve,
    /// Reject the submission with a reason shown to the user.
    Reject {
        /// Reason for rejection.
        #[serde(default)]
        reason: String,
    },
}

impl ReviewDecision {
    /// Checks the decision on its own, before the submission is loaded.
    ///
    /// # Errors
    ///
    /// Returns `KycError::RejectionReasonRequired` for a blank rejection reason.
    pub fn validate(&self) -> Result<(), KycError> {
        match self {
            Self::Reject { reason } if reason.trim().is_empty() => {
                Err(KycError::RejectionReasonRequired)
            }
            _ => Ok(()),
        }
    }
}

/// Result of a valid review, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// New status.
    pub status: KycStatus,
    /// Trimmed rejection reason.
    pub rejection_reason: Option<String>,
    /// Reviewer.
    pub reviewed_by: UserId,
    /// Review time.
    pub reviewed_at: DateTime<Utc>,
}

/// A row of `kyc_verifications`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KycVerification {
    /// Submission ID.
    pub id: KycVerificationId,
    /// Owner.
    pub user_id: UserId,
    /// Document type.
    pub document_type: DocumentType,
    /// Front image key.
    pub front_key: String,
    /// Back image key.
    pub back_key: Option<String>,
    /// Selfie key.
    pub selfie_key: Option<String>,
    /// Status.
    pub status: KycStatus,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
    /// Reviewer.
    pub reviewed_by: Option<UserId>,
    /// Submitted at.
    pub submitted_at: DateTime<Utc>,
    /// Reviewed at.
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl KycVerification {
    /// Stored documents, front first.
    #[must_use]
    pub fn documents(&self) -> Vec<(DocumentSide, &str)> {
        let mut docs = vec![(DocumentSide::Front, self.front_key.as_str())];
        if let Some(key) = &self.back_key {
            docs.push((DocumentSide::Back, key.as_str()));
        }
        if let Some(key) = &self.selfie_key {
            docs.push((DocumentSide::Selfie, key.as_str()));
        }
        docs
    }
}
