//! Live support chat between users and admins.
//!
//! Clients poll `messages?after=<timestamp>` every few seconds; the cursor
//! is exclusive so a message is never delivered twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::{ChatMessageId, ChatSessionId, UserId};

/// Maximum chat message length in characters.
pub const MAX_CHAT_BODY_LEN: usize = 2000;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Accepting messages.
    Open,
    /// Closed by an admin.
    Closed,
}

impl ChatStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::str::FromStr for ChatStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(ChatError::UnknownValue(other.to_string())),
        }
    }
}

/// A row of `chat_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSession {
    /// Session ID.
    pub id: ChatSessionId,
    /// Customer.
    pub user_id: UserId,
    /// Admin who claimed the session.
    pub admin_id: Option<UserId>,
    /// Status.
    pub status: ChatStatus,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Updated at.
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Whether `user_id` takes part in this session.
    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.admin_id == Some(user_id)
    }
}

/// A row of `chat_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Message ID.
    pub id: ChatMessageId,
    /// Session.
    pub session_id: ChatSessionId,
    /// Author.
    pub sender_id: UserId,
    /// Whether the author replied as an admin.
    pub from_admin: bool,
    /// Text.
    pub body: String,
    /// Sent at.
    pub created_at: DateTime<Utc>,
}

/// Message post body.
#[derive(Debug, Clone, Deserialize)]
pub struct PostChatMessage {
    /// Text.
    pub body: String,
}

/// Polling query.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChatPoll {
    /// Only messages strictly after this instant.
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
}

/// Poll response: new messages plus the advertised interval.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPollResponse {
    /// Messages in send order.
    pub messages: Vec<ChatMessage>,
    /// Cursor for the next poll.
    pub cursor: Option<DateTime<Utc>>,
    /// Seconds the client should wait before polling again.
    pub poll_interval_secs: u64,
}

impl ChatPollResponse {
    /// Builds a response, carrying the cursor forward when nothing is new.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>, after: Option<DateTime<Utc>>, poll_interval_secs: u64) -> Self {
        let cursor = messages.last().map(|m| m.created_at).or(after);
        Self {
            messages,
            cursor,
            poll_interval_secs,
        }
    }
}

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Body empty or too long.
    #[error("message must be 1 to {MAX_CHAT_BODY_LEN} characters")]
    InvalidBody,

    /// Session is closed.
    #[error("chat session is closed")]
    SessionClosed,

    /// Session already claimed by another admin.
    #[error("chat session already claimed")]
    AlreadyClaimed,

    /// Session does not exist or is not visible.
    #[error("chat session {0} not found")]
    NotFound(ChatSessionId),

    /// Unrecognized enum value read from storage.
    #[error("unknown chat value: {0}")]
    UnknownValue(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidBody => Self::Validation(err.to_string()),
            ChatError::SessionClosed | ChatError::AlreadyClaimed => Self::Conflict(err.to_string()),
            ChatError::NotFound(_) => Self::NotFound(err.to_string()),
            ChatError::UnknownValue(_) => Self::Internal(err.to_string()),
            ChatError::Database(msg) => Self::Database(msg),
        }
    }
}

/// Validates and trims a message body.
///
/// # Errors
///
/// Returns `ChatError::InvalidBody` for empty or oversized text.
pub fn validate_body(body: &str) -> Result<String, ChatError> {
    let trimmed = body.trim();
    let len = trimmed.chars().count();
    if !(1..=MAX_CHAT_BODY_LEN).contains(&len) {
        return Err(ChatError::InvalidBody);
    }
    Ok(trimmed.to_string())
}

/// Checks that `session` accepts new messages.
///
/// # Errors
///
/// Returns `ChatError::SessionClosed` for closed sessions.
pub fn ensure_open(session: &ChatSession) -> Result<(), ChatError> {
    match session.status {
        ChatStatus::Open => Ok(()),
        ChatStatus::Closed => Err(ChatError::SessionClosed),
    }
}

/// Checks that `admin` may claim `session`. Re-claiming one's own session is a no-op.
///
/// # Errors
///
/// Returns `SessionClosed` or `AlreadyClaimed`.
pub fn ensure_claimable(session: &ChatSession, admin: UserId) -> Result<(), ChatError> {
    ensure_open(session)?;
    match session.admin_id {
        Some(current) if current != admin => Err(ChatError::AlreadyClaimed),
        _ => Ok(()),
    }
}

/// Messages strictly after `after`, in send order.
#[must_use]
pub fn messages_after(mut messages: Vec<ChatMessage>, after: Option<DateTime<Utc>>) -> Vec<ChatMessage> {
    if let Some(after) = after {
        messages.retain(|m| m.created_at > after);
    }
    messages.sort_by_key(|m| (m.created_at, m.id));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(status: ChatStatus, admin_id: Option<UserId>) -> ChatSession {
        let now = Utc::now();
        ChatSession {
            id: ChatSessionId::new(),
            user_id: UserId::new(),
            admin_id,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(session_id: ChatSessionId, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: ChatMessageId::new(),
            session_id,
            sender_id: UserId::new(),
            from_admin: false,
            body: "hi".into(),
            created_at: at,
        }
    }

    #[test]
    fn test_validate_body() {
        assert_eq!(validate_body("  hello ").unwrap(), "hello");
        assert!(validate_body("").is_err());
        assert!(validate_body(&"x".repeat(2000)).is_ok());
        assert!(validate_body(&"x".repeat(2001)).is_err());
    }

    #[test]
    fn test_closed_session_rejects_messages() {
        assert!(ensure_open(&session(ChatStatus::Open, None)).is_ok());
        assert!(matches!(
            ensure_open(&session(ChatStatus::Closed, None)),
            Err(ChatError::SessionClosed)
        ));
    }

    #[test]
    fn test_claim_rules() {
        let admin = UserId::new();
        let other = UserId::new();
        assert!(ensure_claimable(&session(ChatStatus::Open, None), admin).is_ok());
        assert!(ensure_claimable(&session(ChatStatus::Open, Some(admin)), admin).is_ok());
        assert!(matches!(
            ensure_claimable(&session(ChatStatus::Open, Some(other)), admin),
            Err(ChatError::AlreadyClaimed)
        ));
        assert!(matches!(
            ensure_claimable(&session(ChatStatus::Closed, None), admin),
            Err(ChatError::SessionClosed)
        ));
    }

    #[test]
    fn test_messages_after_is_exclusive() {
        let sid = ChatSessionId::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);
        let msgs = vec![message(sid, t2), message(sid, t0), message(sid, t1)];

        let all = messages_after(msgs.clone(), None);
        assert_eq!(all.iter().map(|m| m.created_at).collect::<Vec<_>>(), vec![t0, t1, t2]);

        let after_t1 = messages_after(msgs, Some(t1));
        assert_eq!(after_t1.len(), 1);
        assert_eq!(after_t1[0].created_at, t2);
    }

    #[test]
    fn test_poll_cursor_carries_forward() {
        let sid = ChatSessionId::new();
        let t0 = Utc::now();
        let empty = ChatPollResponse::new(vec![], Some(t0), 2);
        assert_eq!(empty.cursor, Some(t0));
        assert_eq!(empty.poll_interval_secs, 2);

        let t1 = t0 + Duration::seconds(3);
        let fresh = ChatPollResponse::new(vec![message(sid, t1)], Some(t0), 2);
        assert_eq!(fresh.cursor, Some(t1));
    }

    #[test]
    fn test_participants() {
        let admin = UserId::new();
        let s = session(ChatStatus::Open, Some(admin));
        assert!(s.is_participant(s.user_id));
        assert!(s.is_participant(admin));
        assert!(!s.is_participant(UserId::new()));
    }
}
