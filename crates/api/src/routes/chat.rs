//! Live support chat with a polling fallback.
//!
//! Participants poll `GET /chat/sessions/{id}/messages?after=<cursor>` at the
//! advertised interval. Admins claim a session before replying; replying to
//! an unclaimed session claims it.

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
use meridian_core::access::AccessScope;
use meridian_core::chat::{
    ChatError, ChatMessage, ChatPoll, ChatPollResponse, ChatSession, ChatStatus, PostChatMessage,
    validate_body,
};
use meridian_db::ChatRepository;
use meridian_shared::types::{ChatSessionId, UserId};

/// Creates the chat routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat/session", post(open_session))
        .route(
            "/chat/sessions/{session_id}/messages",
            get(poll_messages).post(post_message),
        )
        .route("/admin/chat/sessions", get(list_sessions))
        .route("/admin/chat/sessions/{session_id}/claim", post(claim_session))
        .route("/admin/chat/sessions/{session_id}/messages", post(admin_reply))
        .route("/admin/chat/sessions/{session_id}/close", post(close_session))
}

/// Admin session list filter.
#[derive(Debug, Default, Deserialize)]
pub struct SessionFilter {
    /// Only sessions in this status.
    #[serde(default)]
    pub status: Option<ChatStatus>,
}

/// Loads a session the caller takes part in. Other sessions read as absent.
///
/// A claiming admin is re-checked against their current accessible set, so
/// losing access to the customer also ends access to the conversation.
async fn participant_session(
    state: &AppState,
    repo: &ChatRepository,
    session_id: ChatSessionId,
    user_id: UserId,
) -> ApiResult<ChatSession> {
    let session = repo.get(session_id).await?;
    if !session.is_participant(user_id) {
        return Err(ChatError::NotFound(session_id).into());
    }
    if session.user_id != user_id {
        let scope = state
            .access
            .resolve_for(user_id)
            .await?
            .map_or(AccessScope::Nothing, |(_, scope)| scope);
        scope.ensure_permits(session.user_id)?;
    }
    Ok(session)
}

/// POST /chat/session - Open a session, or return the one already open.
async fn open_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ChatSession>> {
    let session = ChatRepository::new(state.conn())
        .open_for_user(user.user_id())
        .await?;
    Ok(Json(session))
}

/// GET /chat/sessions/{session_id}/messages - Messages after the cursor.
async fn poll_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<ChatSessionId>,
    Query(poll): Query<ChatPoll>,
) -> ApiResult<Json<ChatPollResponse>> {
    let repo = ChatRepository::new(state.conn());
    participant_session(&state, &repo, session_id, user.user_id()).await?;

    let messages = repo.messages_after(session_id, poll.after).await?;
    Ok(Json(ChatPollResponse::new(
        messages,
        poll.after,
        state.chat_poll_interval_secs,
    )))
}

/// POST /chat/sessions/{session_id}/messages - Post as a participant.
async fn post_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<ChatSessionId>,
    Json(payload): Json<PostChatMessage>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let body = validate_body(&payload.body)?;

    let repo = ChatRepository::new(state.conn());
    let session = participant_session(&state, &repo, session_id, user.user_id()).await?;
    let from_admin = session.user_id != user.user_id();

    let message = repo.post(&session, user.user_id(), from_admin, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /admin/chat/sessions - Sessions of accessible users.
async fn list_sessions(
    State(state): State<AppState>,
    ctx: AdminContext,
    Query(filter): Query<SessionFilter>,
) -> ApiResult<Json<Vec<ChatSession>>> {
    let sessions = ChatRepository::new(state.conn())
        .list_scoped(&ctx.scope, filter.status)
        .await?;
    Ok(Json(sessions))
}

/// POST /admin/chat/sessions/{session_id}/claim - Take a session.
async fn claim_session(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(session_id): Path<ChatSessionId>,
) -> ApiResult<Json<ChatSession>> {
    let repo = ChatRepository::new(state.conn());
    let session = repo.get(session_id).await?;
    ctx.ensure_permits(session.user_id)?;

    let claimed = repo.claim(&session, ctx.id()).await?;
    Ok(Json(claimed))
}

/// POST /admin/chat/sessions/{session_id}/messages - Reply as an admin.
async fn admin_reply(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(session_id): Path<ChatSessionId>,
    Json(payload): Json<PostChatMessage>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let body = validate_body(&payload.body)?;

    let repo = ChatRepository::new(state.conn());
    let session = repo.get(session_id).await?;
    ctx.ensure_permits(session.user_id)?;
    let session = if session.admin_id == Some(ctx.id()) {
        session
    } else {
        repo.claim(&session, ctx.id()).await?
    };

    let message = repo.post(&session, ctx.id(), true, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /admin/chat/sessions/{session_id}/close - Close a session.
async fn close_session(
    State(state): State<AppState>,
    ctx: AdminContext,
    Path(session_id): Path<ChatSessionId>,
) -> ApiResult<Json<ChatSession>> {
    let repo = ChatRepository::new(state.conn());
    let session = repo.get(session_id).await?;
    ctx.ensure_permits(session.user_id)?;

    let closed = repo.close(&session).await?;
    tracing::info!(admin_id = %ctx.id(), %session_id, "Chat session closed by admin");
    Ok(Json(closed))
}
