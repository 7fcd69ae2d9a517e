//! Admin-to-user messages and presence heartbeats.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

use meridian_core::access::AccessScope;
use meridian_core::messaging::{Inbox, MessagingError, NewMessage, Presence, UserMessage};
use meridian_shared::types::{MessageId, UserId};

use crate::entities::{user_messages, user_presence};
use crate::scope::ScopedSelect;

fn db_err(err: DbErr) -> MessagingError {
    MessagingError::Database(err.to_string())
}

impl From<user_messages::Model> for UserMessage {
    fn from(m: user_messages::Model) -> Self {
        Self {
            id: MessageId::from_uuid(m.id),
            user_id: UserId::from_uuid(m.user_id),
            sender_id: UserId::from_uuid(m.sender_id),
            subject: m.subject,
            body: m.body,
            is_read: m.is_read,
            created_at: m.created_at.with_timezone(&Utc),
        }
    }
}

impl From<user_presence::Model> for Presence {
    fn from(m: user_presence::Model) -> Self {
        Self {
            user_id: UserId::from_uuid(m.user_id),
            is_online: m.is_online,
            last_seen_at: m.last_seen_at.with_timezone(&Utc),
        }
    }
}

/// Message and presence repository.
#[derive(Debug, Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Creates a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores an already validated message. The caller checks the recipient
    /// is in scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn send(
        &self,
        sender: UserId,
        recipient: UserId,
        message: &NewMessage,
    ) -> Result<UserMessage, MessagingError> {
        let model = user_messages::ActiveModel {
            id: Set(MessageId::new().into_inner()),
            user_id: Set(recipient.into_inner()),
            sender_id: Set(sender.into_inner()),
            subject: Set(message.subject.clone()),
            body: Set(message.body.clone()),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_err)?;

        tracing::info!(sender = %sender, recipient = %recipient, message_id = %model.id, "Message sent");
        Ok(model.into())
    }

    /// A user's messages, newest first, with the unread count.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn inbox(&self, user_id: UserId) -> Result<Inbox, MessagingError> {
        let owned = user_messages::Entity::find()
            .filter(user_messages::Column::UserId.eq(user_id.into_inner()));
        let unread = owned
            .clone()
            .filter(user_messages::Column::IsRead.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)?;
        let messages = owned
            .order_by_desc(user_messages::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(UserMessage::from)
            .collect();
        Ok(Inbox { messages, unread })
    }

    /// Marks one of the user's own messages as read.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::NotFound` when the message does not exist or
    /// belongs to someone else.
    pub async fn mark_read(&self, user_id: UserId, id: MessageId) -> Result<(), MessagingError> {
        let result = user_messages::Entity::update_many()
            .col_expr(user_messages::Column::IsRead, Expr::value(true))
            .filter(user_messages::Column::Id.eq(id.into_inner()))
            .filter(user_messages::Column::UserId.eq(user_id.into_inner()))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(MessagingError::NotFound(id));
        }
        Ok(())
    }

    /// Records a heartbeat: online, seen now.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn heartbeat(&self, user_id: UserId) -> Result<Presence, MessagingError> {
        self.heartbeat_at(user_id, Utc::now()).await
    }

    async fn heartbeat_at(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Presence, MessagingError> {
        let seen: DateTimeWithTimeZone = now.into();
        user_presence::Entity::insert(user_presence::ActiveModel {
            user_id: Set(user_id.into_inner()),
            is_online: Set(true),
            last_seen_at: Set(seen),
        })
        .on_conflict(
            OnConflict::column(user_presence::Column::UserId)
                .update_columns([
                    user_presence::Column::IsOnline,
                    user_presence::Column::LastSeenAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(self.db.as_ref())
        .await
        .map_err(db_err)?;

        Ok(Presence {
            user_id,
            is_online: true,
            last_seen_at: now,
        })
    }

    /// Presence rows of users in `scope`, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn presence_scoped(&self, scope: &AccessScope) -> Result<Vec<Presence>, MessagingError> {
        Ok(user_presence::Entity::find()
            .scoped(user_presence::Column::UserId, scope)
            .order_by_desc(user_presence::Column::LastSeenAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Presence::from)
            .collect())
    }
}
