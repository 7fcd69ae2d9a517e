//! `TransactionHistory` repository.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use meridian_core::balance::{BalanceError, HistoryEntry, HistoryKind};
use meridian_shared::types::{Currency, PageRequest, UserId};

use crate::entities::transaction_history;

/// Status written on every history row; rows record finished movements.
pub const COMPLETED: &str = "completed";

/// A history row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryRow {
    /// Owner.
    pub user_id: UserId,
    /// Kind.
    pub kind: HistoryKind,
    /// Currency.
    pub currency: Currency,
    /// Signed amount.
    pub amount: Decimal,
    /// Description.
    pub description: Option<String>,
    /// Idempotency key; a second insert with the same key is a no-op.
    pub reference: Option<String>,
}

impl TryFrom<transaction_history::Model> for HistoryEntry {
    type Error = BalanceError;

    fn try_from(m: transaction_history::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            user_id: UserId::from_uuid(m.user_id),
            kind: m.th_type.parse()?,
            currency: m.currency.parse().map_err(BalanceError::UnknownValue)?,
            amount: m.amount,
            description: m.description,
            reference: m.reference,
            status: m.status,
            created_at: m.created_at.with_timezone(&Utc),
        })
    }
}

/// Transaction history repository.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    db: Arc<DatabaseConnection>,
}

impl HistoryRepository {
    /// Creates a new history repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// A user's history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an unknown value.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<HistoryEntry>, BalanceError> {
        Self::list_for_user_in(self.db.as_ref(), user_id, page).await
    }

    /// A user's history on `conn`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row holds an unknown value.
    pub async fn list_for_user_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<Vec<HistoryEntry>, BalanceError> {
        transaction_history::Entity::find()
            .filter(transaction_history::Column::UserId.eq(user_id.into_inner()))
            .order_by_desc(transaction_history::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(conn)
            .await
            .map_err(|e| BalanceError::Database(e.to_string()))?
            .into_iter()
            .map(HistoryEntry::try_from)
            .collect()
    }

    /// Inserts a row. Returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn record_in<C: ConnectionTrait>(conn: &C, row: NewHistoryRow) -> Result<bool, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let inserted = transaction_history::Entity::insert(transaction_history::ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(row.user_id.into_inner()),
            th_type: Set(row.kind.as_str().to_string()),
            currency: Set(row.currency.code().to_string()),
            amount: Set(row.amount),
            description: Set(row.description),
            reference: Set(row.reference),
            status: Set(COMPLETED.to_string()),
            created_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(transaction_history::Column::Reference)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
        Ok(inserted > 0)
    }
}
