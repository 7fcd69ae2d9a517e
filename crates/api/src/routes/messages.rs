//! Admin-to-user messages and presence.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiResult;
use crate::middleware::{AdminContext, AuthUser};
use meridian_core::messaging::{Inbox, NewMessage, Presence, UserMessage, validate_message};
use meridian_db::{MessageRepository, UserRepository};
use meridian_shared::types::{MessageId, UserId};

/// Creates the messaging and presence routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/messages", get(inbox))
        .route("/me/messages/{message_id}/read", post(mark_read))
        .route("/me/presence", post(heartbeat))
        .route("/admin/users/{user_id}/messages", post(send_message))
        .route("/admin/presence", get(presence))
}

/// Presence as shown to admins.
#[derive(Debug, Serialize)]
pub struct PresenceView {
    /// User.
    pub user_id: UserId,
    /// Seen within the online window.
    pub online: bool,
    /// Last heartbeat.
    pub last_seen_at: DateTime<Utc>,
}

impl PresenceView {
    fn at(presence: Presence, now: DateTime<Utc>) -> Self {
        Self {
            user_id: presence.user_id,
            online: presence.is_online_at(now),
            last_seen_at: presence.last_seen_at,
        }
    }
}

/// GET /me/messages - The caller's inbox with unread count.
async fn inbox(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Inbox>> {
    let inbox = MessageRepository::new(state.conn()).inbox(user.user_id()).await?;
    Ok(Json(inbox))
}

/// POST /me/messages/{message_id}/read - Mark one message read.
async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<MessageId>,
) -> ApiResult<StatusCode> {
    MessageRepository::new(state.conn())
        .mark_read(user.user_id(), message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /me/presence - Heartbeat.
async fn heartbeat(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Presence>> {
    let presence = MessageRepository::new(state.conn())
        .heartbeat(user.user_id())
        .await?;
    Ok(Json(presence))
}

/// POST /admin/users/{user_id}/messages - Message an accessible user.
async fn send_message(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(user_id): Path<UserId>,
    Json(payload): Json<NewMessage>,
) -> ApiResult<(StatusCode, Json<UserMessage>)> {
    let message = validate_message(&payload)?;
    ctx.ensure_permits(user_id)?;

    UserRepository::new(state.conn()).get(user_id).await?;
    let sent = MessageRepository::new(state.conn())
        .send(ctx.id(), user_id, &message)
        .await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

/// GET /admin/presence - Presence of accessible users.
async fn presence(
    State(state): State<AppState>,
    ctx: AdminContext,
) -> ApiResult<Json<Vec<PresenceView>>> {
    let now = Utc::now();
    let rows = MessageRepository::new(state.conn())
        .presence_scoped(&ctx.scope)
        .await?;
    Ok(Json(rows.into_iter().map(|p| PresenceView::at(p, now)).collect()))
}
