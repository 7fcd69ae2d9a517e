//! KYC submission and review routes.
//!
//! Clients upload each image straight to object storage with a presigned
//! URL, then submit the keys. Reviewers read the images through presigned
//! download URLs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::{AdminContext, AuthUser};
use meridian_core::kyc::{
    DocumentLink, DocumentUpload, KycDocuments, KycService, KycStatus, KycSubmission,
    KycVerification, ReviewDecision, UploadDocumentRequest,
};
use meridian_db::{KycRepository, UserRepository};
use meridian_shared::AppError;
use meridian_shared::types::{KycVerificationId, PageRequest, PageResponse};

/// Creates the KYC routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/kyc", get(my_kyc).post(submit))
        .route("/me/kyc/uploads", post(request_upload))
        .route("/admin/kyc", get(list_submissions))
        .route("/admin/kyc/{verification_id}/review", post(review))
        .route("/admin/kyc/{verification_id}/documents", get(documents))
}

/// The caller's verification state.
#[derive(Debug, Serialize)]
pub struct KycOverview {
    /// Status as shown on the profile.
    pub status: KycStatus,
    /// Latest submission.
    pub verification: Option<KycVerification>,
}

/// Admin queue filter.
#[derive(Debug, Default, Deserialize)]
pub struct KycFilter {
    /// Only submissions in this status.
    #[serde(default)]
    pub status: Option<KycStatus>,
}

fn documents_service(state: &AppState) -> Result<Arc<KycDocuments>, AppError> {
    state
        .kyc_documents
        .clone()
        .ok_or_else(|| AppError::ExternalService("document storage is not configured".into()))
}

/// GET /me/kyc - Latest submission and status.
async fn my_kyc(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<KycOverview>> {
    let profile = UserRepository::new(state.conn()).get(user.user_id()).await?;
    let verification = KycRepository::new(state.conn())
        .latest_for_user(user.user_id())
        .await?;
    Ok(Json(KycOverview {
        status: profile.kyc_status,
        verification,
    }))
}

/// POST /me/kyc/uploads - Presigned upload URL for one document image.
async fn request_upload(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UploadDocumentRequest>,
) -> ApiResult<Json<DocumentUpload>> {
    let documents = documents_service(&state)?;
    let upload = documents.request_upload(user.user_id(), &payload).await?;
    Ok(Json(upload))
}

/// POST /me/kyc - Submit uploaded documents for review.
async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<KycSubmission>,
) -> ApiResult<(StatusCode, Json<KycVerification>)> {
    KycService::validate_submission(user.user_id(), &payload, None)?;
    documents_service(&state)?.verify_uploaded(&payload).await?;

    let verification = KycRepository::new(state.conn())
        .submit(user.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(verification)))
}

/// GET /admin/kyc - Submissions of accessible users, oldest first.
async fn list_submissions(
    State(state): State<AppState>,
    ctx: AdminContext,
    Query(page): Query<PageRequest>,
    Query(filter): Query<KycFilter>,
) -> ApiResult<Json<PageResponse<KycVerification>>> {
    let (items, total) = KycRepository::new(state.conn())
        .list_scoped(&ctx.scope, filter.status, &page)
        .await?;
    Ok(Json(PageResponse::new(items, &page, total)))
}

/// POST /admin/kyc/{verification_id}/review - Approve or reject.
async fn review(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(verification_id): Path<KycVerificationId>,
    Json(decision): Json<ReviewDecision>,
) -> ApiResult<Json<KycVerification>> {
    decision.validate()?;

    let repo = KycRepository::new(state.conn());
    let current = repo.get(verification_id).await?;
    ctx.ensure_permits(current.user_id)?;

    let reviewed = repo.review(verification_id, &decision, ctx.id()).await?;
    Ok(Json(reviewed))
}

/// GET /admin/kyc/{verification_id}/documents - Presigned download links.
async fn documents(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(verification_id): Path<KycVerificationId>,
) -> ApiResult<Json<Vec<DocumentLink>>> {
    let verification = KycRepository::new(state.conn()).get(verification_id).await?;
    ctx.ensure_permits(verification.user_id)?;

    let links = documents_service(&state)?
        .download_links(&verification)
        .await?;
    Ok(Json(links))
}
