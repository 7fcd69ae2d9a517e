//! Admin-to-user messages and presence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::{MessageId, UserId};

/// Maximum subject length in characters.
pub const MAX_SUBJECT_LEN: usize = 200;
/// Maximum body length in characters.
pub const MAX_BODY_LEN: usize = 5000;
/// A user seen within this many seconds counts as online.
pub const ONLINE_WINDOW_SECS: i64 = 60;

/// Admin request to message a user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// A row of `user_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    /// Message ID.
    pub id: MessageId,
    /// Recipient.
    pub user_id: UserId,
    /// Sending admin.
    pub sender_id: UserId,
    /// Subject.
    pub subject: String,
    /// Body.
    pub body: String,
    /// Read flag.
    pub is_read: bool,
    /// Sent at.
    pub created_at: DateTime<Utc>,
}

/// Inbox listing with unread count.
#[derive(Debug, Clone, Serialize)]
pub struct Inbox {
    /// Messages, newest first.
    pub messages: Vec<UserMessage>,
    /// Unread messages.
    pub unread: u64,
}

/// A row of `user_presence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Presence {
    /// User.
    pub user_id: UserId,
    /// Last heartbeat flag.
    pub is_online: bool,
    /// Last heartbeat time.
    pub last_seen_at: DateTime<Utc>,
}

impl Presence {
    /// Online only if the flag is set and the heartbeat is recent.
    #[must_use]
    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        self.is_online && now - self.last_seen_at <= Duration::seconds(ONLINE_WINDOW_SECS)
    }
}

/// Messaging errors.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Subject empty or too long.
    #[error("subject must be 1 to {MAX_SUBJECT_LEN} characters")]
    InvalidSubject,

    /// Body empty or too long.
    #[error("body must be 1 to {MAX_BODY_LEN} characters")]
    InvalidBody,

    /// Message does not exist or belongs to someone else.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::InvalidSubject | MessagingError::InvalidBody => {
                Self::Validation(err.to_string())
            }
            MessagingError::NotFound(_) => Self::NotFound(err.to_string()),
            MessagingError::Database(msg) => Self::Database(msg),
        }
    }
}

fn within(text: &str, max: usize) -> bool {
    let len = text.trim().chars().count();
    (1..=max).contains(&len)
}

/// Validates and trims a new message.
///
/// # Errors
///
/// Returns `InvalidSubject` or `InvalidBody`.
pub fn validate_message(msg: &NewMessage) -> Result<NewMessage, MessagingError> {
    if !within(&msg.subject, MAX_SUBJECT_LEN) {
        return Err(MessagingError::InvalidSubject);
    }
    if !within(&msg.body, MAX_BODY_LEN) {
        return Err(MessagingError::InvalidBody);
    }
    Ok(NewMessage {
        subject: msg.subject.trim().to_string(),
        body: msg.body.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn msg(subject: &str, body: &str) -> NewMessage {
        NewMessage {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_valid_message_is_trimmed() {
        let ok = validate_message(&msg("  Hello ", " Your card shipped. ")).unwrap();
        assert_eq!(ok.subject, "Hello");
        assert_eq!(ok.body, "Your card shipped.");
    }

    #[rstest]
    #[case(0, 4, false)]
    #[case(7, 0, false)]
    #[case(200, 4, true)]
    #[case(201, 4, false)]
    #[case(7, 5000, true)]
    #[case(7, 5001, false)]
    fn test_length_bounds(#[case] subject_len: usize, #[case] body_len: usize, #[case] valid: bool) {
        let m = msg(&"s".repeat(subject_len), &"b".repeat(body_len));
        assert_eq!(validate_message(&m).is_ok(), valid);
    }

    #[test]
    fn test_whitespace_only_subject_rejected() {
        assert!(matches!(
            validate_message(&msg("   ", "body")),
            Err(MessagingError::InvalidSubject)
        ));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert!(validate_message(&msg(&"é".repeat(200), "ok")).is_ok());
    }

    #[test]
    fn test_presence_window() {
        let now = Utc::now();
        let recent = Presence {
            user_id: UserId::new(),
            is_online: true,
            last_seen_at: now - Duration::seconds(30),
        };
        let stale = Presence {
            last_seen_at: now - Duration::seconds(61),
            ..recent
        };
        let offline = Presence {
            is_online: false,
            ..recent
        };
        assert!(recent.is_online_at(now));
        assert!(!stale.is_online_at(now));
        assert!(!offline.is_online_at(now));
    }
}
