//! API route definitions.

use axum::{Router, middleware};
use sea_orm::DbErr;

use crate::error::ApiError;
use crate::{AppState, middleware::auth::auth_middleware};
use meridian_shared::AppError;

pub mod auth;
pub mod chat;
pub mod health;
pub mod kyc;
pub mod messages;
pub mod taxes;
pub mod transfers;
pub mod users;

/// Routes that need no token.
pub fn public_routes() -> Router<AppState> {
    Router::new().merge(health::routes()).merge(auth::routes())
}

/// Creates the API router; everything but the public routes requires a
/// valid access token.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .merge(users::routes())
        .merge(taxes::routes())
        .merge(kyc::routes())
        .merge(transfers::routes())
        .merge(messages::routes())
        .merge(chat::routes())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    public_routes().merge(protected_routes)
}

/// Maps a raw database error from an RLS-scoped read.
pub(crate) fn db_error(err: DbErr) -> ApiError {
    ApiError(AppError::Database(err.to_string()))
}

#[cfg(test)]
mod tests;
