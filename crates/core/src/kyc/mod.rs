//! Know-your-customer document submission and review.
//!
//! # Modules
//!
//! - `types` - Document types, sides, statuses and review decisions
//! - `service` - Submission rules, review transitions and presigned document access
//! - `error` - KYC error types

pub mod error;
pub mod service;
pub mod types;

pub use error::KycError;
pub use service::{DocumentLink, DocumentUpload, KycDocuments, KycService};
pub use types::{
    DocumentSide, DocumentType, KycStatus, KycSubmission, KycVerification, ReviewDecision,
    ReviewOutcome, UploadDocumentRequest,
};
