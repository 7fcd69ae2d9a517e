//! Tax ledger routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};

use super::db_error;
use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::{AdminContext, AuthUser};
use meridian_core::tax::{TaxRecord, TaxUpdate, validate_update};
use meridian_db::TaxRepository;
use meridian_db::rls::RlsExt;
use meridian_shared::types::{TaxId, UserId};

/// Creates the tax routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/taxes", get(my_taxes))
        .route("/admin/users/{user_id}/taxes", get(user_taxes))
        .route("/admin/taxes/{tax_id}", put(update_tax))
}

/// GET /me/taxes - The caller's tax rows, read under their RLS context.
async fn my_taxes(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<TaxRecord>>> {
    let rls = state.db.with_rls(user.user_id()).await.map_err(db_error)?;
    let taxes = TaxRepository::list_for_user_in(rls.transaction(), user.user_id()).await?;
    rls.commit().await.map_err(db_error)?;
    Ok(Json(taxes))
}

/// GET /admin/users/{user_id}/taxes - Tax rows of an accessible user.
async fn user_taxes(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<Vec<TaxRecord>>> {
    ctx.ensure_permits(user_id)?;
    let taxes = TaxRepository::new(state.conn()).list_for_user(user_id).await?;
    Ok(Json(taxes))
}

/// PUT /admin/taxes/{tax_id} - Edit amount or status.
async fn update_tax(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(tax_id): Path<TaxId>,
    Json(payload): Json<TaxUpdate>,
) -> ApiResult<Json<TaxRecord>> {
    validate_update(&payload)?;

    let repo = TaxRepository::new(state.conn());
    let current = repo.get(tax_id).await?;
    ctx.ensure_permits(current.user_id)?;

    let updated = repo.update(tax_id, &payload).await?;
    tracing::info!(admin_id = %ctx.id(), %tax_id, user_id = %updated.user_id, "Tax record updated");
    Ok(Json(updated))
}
