//! Outbound transfer routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::{AdminContext, AuthUser};
use meridian_core::transfer::{
    Transfer, TransferDecision, TransferRequest, TransferStatus, validate_request,
};
use meridian_db::TransferRepository;
use meridian_shared::types::{PageRequest, PageResponse, TransferId};

/// Creates the transfer routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/transfers", get(my_transfers).post(request_transfer))
        .route("/admin/transfers", get(list_transfers))
        .route("/admin/transfers/{transfer_id}/review", post(review_transfer))
}

/// Admin queue filter.
#[derive(Debug, Default, Deserialize)]
pub struct TransferFilter {
    /// Only transfers in this status.
    #[serde(default)]
    pub status: Option<TransferStatus>,
}

/// Review body.
#[derive(Debug, Deserialize)]
pub struct ReviewTransferRequest {
    /// Complete or reject.
    pub decision: TransferDecision,
}

/// GET /me/transfers - The caller's transfers, newest first.
async fn my_transfers(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Transfer>>> {
    let transfers = TransferRepository::new(state.conn())
        .list_for_user(user.user_id())
        .await?;
    Ok(Json(transfers))
}

/// POST /me/transfers - Request an outbound transfer.
async fn request_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<TransferRequest>,
) -> ApiResult<(StatusCode, Json<Transfer>)> {
    validate_request(&payload)?;
    let transfer = TransferRepository::new(state.conn())
        .create(user.user_id(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// GET /admin/transfers - Transfers of accessible users, oldest first.
async fn list_transfers(
    State(state): State<AppState>,
    ctx: AdminContext,
    Query(page): Query<PageRequest>,
    Query(filter): Query<TransferFilter>,
) -> ApiResult<Json<PageResponse<Transfer>>> {
    let (items, total) = TransferRepository::new(state.conn())
        .list_scoped(&ctx.scope, filter.status, &page)
        .await?;
    Ok(Json(PageResponse::new(items, &page, total)))
}

/// POST /admin/transfers/{transfer_id}/review - Complete or reject.
async fn review_transfer(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(transfer_id): Path<TransferId>,
    Json(payload): Json<ReviewTransferRequest>,
) -> ApiResult<Json<Transfer>> {
    let repo = TransferRepository::new(state.conn());
    let current = repo.get(transfer_id).await?;
    ctx.ensure_permits(current.user_id)?;

    let reviewed = repo.review(transfer_id, payload.decision, ctx.id()).await?;
    Ok(Json(reviewed))
}
