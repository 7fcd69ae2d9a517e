//! Live chat sessions and messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};

use meridian_core::access::AccessScope;
use meridian_core::chat::{
    ChatError, ChatMessage, ChatSession, ChatStatus, ensure_claimable, ensure_open, messages_after,
};
use meridian_shared::types::{ChatMessageId, ChatSessionId, UserId};

use crate::entities::{chat_messages, chat_sessions};
use crate::scope::ScopedSelect;

fn db_err(err: DbErr) -> ChatError {
    ChatError::Database(err.to_string())
}

impl TryFrom<chat_sessions::Model> for ChatSession {
    type Error = ChatError;

    fn try_from(m: chat_sessions::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ChatSessionId::from_uuid(m.id),
            user_id: UserId::from_uuid(m.user_id),
            admin_id: m.admin_id.map(UserId::from_uuid),
            status: m.status.parse()?,
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        })
    }
}

impl From<chat_messages::Model> for ChatMessage {
    fn from(m: chat_messages::Model) -> Self {
        Self {
            id: ChatMessageId::from_uuid(m.id),
            session_id: ChatSessionId::from_uuid(m.session_id),
            sender_id: UserId::from_uuid(m.sender_id),
            from_admin: m.from_admin,
            body: m.body,
            created_at: m.created_at.with_timezone(&Utc),
        }
    }
}

/// Chat repository.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    db: Arc<DatabaseConnection>,
}

impl ChatRepository {
    /// Creates a new chat repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_open(&self, user_id: UserId) -> Result<Option<chat_sessions::Model>, ChatError> {
        chat_sessions::Entity::find()
            .filter(chat_sessions::Column::UserId.eq(user_id.into_inner()))
            .filter(chat_sessions::Column::Status.eq(ChatStatus::Open.as_str()))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// The user's open session, created if none exists.
    ///
    /// Two concurrent opens race on `uq_chat_sessions_open`; the loser's
    /// insert fails and it returns the winner's session instead.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn open_for_user(&self, user_id: UserId) -> Result<ChatSession, ChatError> {
        if let Some(session) = self.find_open(user_id).await? {
            return ChatSession::try_from(session);
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        let inserted = chat_sessions::ActiveModel {
            id: Set(ChatSessionId::new().into_inner()),
            user_id: Set(user_id.into_inner()),
            admin_id: Set(None),
            status: Set(ChatStatus::Open.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await;

        let model = match inserted {
            Ok(model) => model,
            Err(err) => {
                let Some(session) = self.find_open(user_id).await? else {
                    return Err(db_err(err));
                };
                tracing::debug!(%user_id, session_id = %session.id, "Concurrent open, reusing session");
                return ChatSession::try_from(session);
            }
        };

        tracing::info!(user_id = %user_id, session_id = %model.id, "Chat session opened");
        ChatSession::try_from(model)
    }

    /// Finds a session.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NotFound` when it does not exist.
    pub async fn get(&self, id: ChatSessionId) -> Result<ChatSession, ChatError> {
        chat_sessions::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(ChatError::NotFound(id))
            .and_then(ChatSession::try_from)
    }

    /// Sessions of users in `scope`, optionally by status, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_scoped(
        &self,
        scope: &AccessScope,
        status: Option<ChatStatus>,
    ) -> Result<Vec<ChatSession>, ChatError> {
        let mut query = chat_sessions::Entity::find().scoped(chat_sessions::Column::UserId, scope);
        if let Some(status) = status {
            query = query.filter(chat_sessions::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(chat_sessions::Column::UpdatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(ChatSession::try_from)
            .collect()
    }

    /// Appends a validated message to an open session and bumps its
    /// `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` or a database error.
    pub async fn post(
        &self,
        session: &ChatSession,
        sender: UserId,
        from_admin: bool,
        body: String,
    ) -> Result<ChatMessage, ChatError> {
        ensure_open(session)?;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let txn = self.db.begin().await.map_err(db_err)?;
        let model = chat_messages::ActiveModel {
            id: Set(ChatMessageId::new().into_inner()),
            session_id: Set(session.id.into_inner()),
            sender_id: Set(sender.into_inner()),
            from_admin: Set(from_admin),
            body: Set(body),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_err)?;
        chat_sessions::Entity::update_many()
            .col_expr(chat_sessions::Column::UpdatedAt, Expr::value(now))
            .filter(chat_sessions::Column::Id.eq(session.id.into_inner()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        Ok(model.into())
    }

    /// Messages of a session strictly after `after`, in send order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn messages_after(
        &self,
        session_id: ChatSessionId,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let mut query = chat_messages::Entity::find()
            .filter(chat_messages::Column::SessionId.eq(session_id.into_inner()));
        if let Some(after) = after {
            let after: DateTimeWithTimeZone = after.into();
            query = query.filter(chat_messages::Column::CreatedAt.gt(after));
        }
        let rows = query
            .order_by_asc(chat_messages::Column::CreatedAt)
            .order_by_asc(chat_messages::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(messages_after(
            rows.into_iter().map(ChatMessage::from).collect(),
            after,
        ))
    }

    /// Assigns an open session to `admin`. The caller checks the customer is
    /// in scope.
    ///
    /// The update only matches unclaimed sessions or ones the admin already
    /// holds, so two admins racing for a session cannot both win.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed`, `AlreadyClaimed` or a database error.
    pub async fn claim(&self, session: &ChatSession, admin: UserId) -> Result<ChatSession, ChatError> {
        ensure_claimable(session, admin)?;

        let result = chat_sessions::Entity::update_many()
            .col_expr(chat_sessions::Column::AdminId, Expr::value(admin.into_inner()))
            .col_expr(
                chat_sessions::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(chat_sessions::Column::Id.eq(session.id.into_inner()))
            .filter(chat_sessions::Column::Status.eq(ChatStatus::Open.as_str()))
            .filter(
                Condition::any()
                    .add(chat_sessions::Column::AdminId.is_null())
                    .add(chat_sessions::Column::AdminId.eq(admin.into_inner())),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(ChatError::AlreadyClaimed);
        }

        tracing::info!(session_id = %session.id, admin_id = %admin, "Chat session claimed");
        Ok(ChatSession {
            admin_id: Some(admin),
            ..session.clone()
        })
    }

    /// Closes a session; later posts are rejected.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if it was already closed, or a database error.
    pub async fn close(&self, session: &ChatSession) -> Result<ChatSession, ChatError> {
        ensure_open(session)?;

        let now = Utc::now();
        chat_sessions::Entity::update_many()
            .col_expr(
                chat_sessions::Column::Status,
                Expr::value(ChatStatus::Closed.as_str()),
            )
            .col_expr(
                chat_sessions::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(now)),
            )
            .filter(chat_sessions::Column::Id.eq(session.id.into_inner()))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        tracing::info!(session_id = %session.id, "Chat session closed");
        Ok(ChatSession {
            status: ChatStatus::Closed,
            updated_at: now,
            ..session.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::transaction_log;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

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

    fn affected(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_open_reuses_existing_session() {
        let user = Uuid::now_v7();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let existing = chat_sessions::Model {
            id: Uuid::now_v7(),
            user_id: user,
            admin_id: None,
            status: "open".into(),
            created_at: now,
            updated_at: now,
        };
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .into_connection());

        let session = ChatRepository::new(Arc::clone(&db))
            .open_for_user(UserId::from_uuid(user))
            .await
            .unwrap();
        assert_eq!(session.id, ChatSessionId::from_uuid(existing.id));
        // A single SELECT, no INSERT.
        assert_eq!(transaction_log(db).len(), 1);
    }

    #[tokio::test]
    async fn test_open_race_returns_winning_session() {
        let user = Uuid::now_v7();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let winner = chat_sessions::Model {
            id: Uuid::now_v7(),
            user_id: user,
            admin_id: None,
            status: "open".into(),
            created_at: now,
            updated_at: now,
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<chat_sessions::Model>::new()])
                .append_query_errors([DbErr::Custom(
                    "duplicate key value violates unique constraint \"uq_chat_sessions_open\"".into(),
                )])
                .append_query_results([vec![winner.clone()]])
                .into_connection(),
        );

        let session = ChatRepository::new(Arc::clone(&db))
            .open_for_user(UserId::from_uuid(user))
            .await
            .unwrap();
        assert_eq!(session.id, ChatSessionId::from_uuid(winner.id));
        assert_eq!(transaction_log(db).len(), 3);
    }

    #[tokio::test]
    async fn test_open_insert_failure_without_winner_is_an_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<chat_sessions::Model>::new()])
            .append_query_errors([DbErr::Custom("connection reset".into())])
            .append_query_results([Vec::<chat_sessions::Model>::new()])
            .into_connection();

        let result = ChatRepository::new(Arc::new(db))
            .open_for_user(UserId::new())
            .await;
        assert!(matches!(result, Err(ChatError::Database(_))));
    }

    #[tokio::test]
    async fn test_post_to_closed_session_is_rejected() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let result = ChatRepository::new(Arc::clone(&db))
            .post(&session(ChatStatus::Closed, None), UserId::new(), false, "hi".into())
            .await;
        assert!(matches!(result, Err(ChatError::SessionClosed)));
        assert!(transaction_log(db).is_empty());
    }

    #[tokio::test]
    async fn test_lost_claim_race_reports_already_claimed() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0)])
            .into_connection();
        let result = ChatRepository::new(Arc::new(db))
            .claim(&session(ChatStatus::Open, None), UserId::new())
            .await;
        assert!(matches!(result, Err(ChatError::AlreadyClaimed)));
    }

    #[tokio::test]
    async fn test_claim_sets_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(1)])
            .into_connection();
        let admin = UserId::new();
        let claimed = ChatRepository::new(Arc::new(db))
            .claim(&session(ChatStatus::Open, None), admin)
            .await
            .unwrap();
        assert_eq!(claimed.admin_id, Some(admin));
    }

    #[tokio::test]
    async fn test_messages_after_uses_exclusive_bound() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<chat_messages::Model>::new()])
            .into_connection());
        ChatRepository::new(Arc::clone(&db))
            .messages_after(ChatSessionId::new(), Some(Utc::now()))
            .await
            .unwrap();
        let sql = format!("{:?}", transaction_log(db));
        assert!(sql.contains(r#"\"created_at\" > "#), "{sql}");
    }
}
