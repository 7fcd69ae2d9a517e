//! Profile, balance and history routes, plus the admin user directory.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::db_error;
use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::{AdminContext, AuthUser};
use meridian_core::balance::{BalanceSheet, HistoryEntry, SetBalanceRequest, validate_amount};
use meridian_db::rls::RlsExt;
use meridian_db::{BalanceRepository, HistoryRepository, UserProfile, UserRepository};
use meridian_shared::AppError;
use meridian_shared::types::{Currency, PageRequest, PageResponse, UserId};

/// Creates the user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/me/balances", get(my_balances))
        .route("/me/transactions", get(my_transactions))
        .route("/admin/scope", get(admin_scope))
        .route("/admin/users", get(search_users))
        .route("/admin/users/{user_id}", get(get_user))
        .route(
            "/admin/users/{user_id}/balances/{currency}",
            put(set_balance),
        )
}

/// Search filter for the admin directory.
#[derive(Debug, Default, Deserialize)]
pub struct UserSearch {
    /// Matches email or full name, case-insensitively.
    #[serde(default)]
    pub q: Option<String>,
}

/// Admin view of one user.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    /// Profile.
    #[serde(flatten)]
    pub user: UserProfile,
    /// All four balances.
    pub balances: BalanceSheet,
}

/// Result of an admin balance change.
#[derive(Debug, Serialize)]
pub struct BalanceChange {
    /// Owner.
    pub user_id: UserId,
    /// Currency.
    pub currency: Currency,
    /// Balance before.
    pub previous: Decimal,
    /// Balance after.
    pub amount: Decimal,
    /// Recorded delta.
    pub delta: Decimal,
}

/// GET /me - The caller's profile.
async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserProfile>> {
    let profile = UserRepository::new(state.conn()).get(user.user_id()).await?;
    Ok(Json(profile))
}

/// GET /me/balances - The caller's balances, read under their RLS context.
async fn my_balances(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<BalanceSheet>> {
    let rls = state.db.with_rls(user.user_id()).await.map_err(db_error)?;
    let sheet = BalanceRepository::sheet_in(rls.transaction(), user.user_id())
        .await
        .map_err(db_error)?;
    rls.commit().await.map_err(db_error)?;
    Ok(Json(sheet))
}

/// GET /me/transactions - The caller's history, newest first.
async fn my_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let rls = state.db.with_rls(user.user_id()).await.map_err(db_error)?;
    let entries =
        HistoryRepository::list_for_user_in(rls.transaction(), user.user_id(), &page).await?;
    rls.commit().await.map_err(db_error)?;
    Ok(Json(entries))
}

/// GET /admin/scope - The caller's role and accessible set.
async fn admin_scope(ctx: AdminContext) -> Json<AdminContext> {
    Json(ctx)
}

/// GET /admin/users - Accessible users, optionally filtered by `q`.
async fn search_users(
    State(state): State<AppState>,
    ctx: AdminContext,
    Query(page): Query<PageRequest>,
    Query(search): Query<UserSearch>,
) -> ApiResult<Json<PageResponse<UserProfile>>> {
    let (users, total) = UserRepository::new(state.conn())
        .search(&ctx.scope, search.q.as_deref(), &page)
        .await?;
    Ok(Json(PageResponse::new(users, &page, total)))
}

/// GET /admin/users/{user_id} - Profile and balances of an accessible user.
async fn get_user(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<UserDetail>> {
    ctx.ensure_permits(user_id)?;
    let user = UserRepository::new(state.conn()).get(user_id).await?;
    let balances = BalanceRepository::new(state.conn()).sheet(user_id).await?;
    Ok(Json(UserDetail { user, balances }))
}

/// PUT /admin/users/{user_id}/balances/{currency} - Set one balance.
async fn set_balance(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path((user_id, currency)): Path<(UserId, String)>,
    Json(payload): Json<SetBalanceRequest>,
) -> ApiResult<Json<BalanceChange>> {
    let currency: Currency = currency.parse().map_err(AppError::Validation)?;
    validate_amount(payload.amount)?;
    ctx.ensure_permits(user_id)?;

    UserRepository::new(state.conn()).get(user_id).await?;
    let adjustment = BalanceRepository::new(state.conn())
        .set_balance(user_id, currency, &payload)
        .await?;

    tracing::info!(admin_id = %ctx.id(), %user_id, %currency, "Admin set balance");
    Ok(Json(BalanceChange {
        user_id,
        currency,
        previous: adjustment.previous,
        amount: adjustment.new_amount,
        delta: adjustment.delta,
    }))
}
