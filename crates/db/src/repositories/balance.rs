//! Balance repository over the four per-currency tables.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use meridian_core::balance::{
    Adjustment, Balance, BalanceError, BalanceSheet, HistoryKind, SetBalanceRequest,
    plan_adjustment, validate_amount,
};
use meridian_shared::types::{Currency, UserId};

use super::history::{HistoryRepository, NewHistoryRow};

/// Runs `$body` with `$table` bound to the entity module backing `$currency`.
macro_rules! balance_table {
    ($currency:expr, $table:ident => $body:expr) => {
        match $currency {
            Currency::Usd => {
                use crate::entities::usd_balances as $table;
                $body
            }
            Currency::Euro => {
                use crate::entities::euro_balances as $table;
                $body
            }
            Currency::Cad => {
                use crate::entities::cad_balances as $table;
                $body
            }
            Currency::NewCrypto => {
                use crate::entities::newcrypto_balances as $table;
                $body
            }
        }
    };
}

fn db_err(err: DbErr) -> BalanceError {
    BalanceError::Database(err.to_string())
}

/// Balance repository.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    db: Arc<DatabaseConnection>,
}

impl BalanceRepository {
    /// Creates a new balance repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All four balances of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn sheet(&self, user_id: UserId) -> Result<BalanceSheet, BalanceError> {
        Self::sheet_in(self.db.as_ref(), user_id).await.map_err(db_err)
    }

    /// Sets a balance on behalf of an admin and records the delta in
    /// `TransactionHistory`. The caller checks the target is in scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error before touching the database, or a
    /// database error; nothing is written on failure.
    pub async fn set_balance(
        &self,
        user_id: UserId,
        currency: Currency,
        request: &SetBalanceRequest,
    ) -> Result<Adjustment, BalanceError> {
        validate_amount(request.amount)?;

        let txn = self.db.begin().await.map_err(db_err)?;
        let previous = Self::find_for_update_in(&txn, user_id, currency)
            .await
            .map_err(db_err)?
            .map_or(Decimal::ZERO, |b| b.amount);
        let adjustment = plan_adjustment(user_id, currency, previous, request)?;

        Self::upsert_in(&txn, user_id, currency, adjustment.new_amount)
            .await
            .map_err(db_err)?;
        HistoryRepository::record_in(
            &txn,
            NewHistoryRow {
                user_id,
                kind: HistoryKind::Adjustment,
                currency,
                amount: adjustment.delta,
                description: Some(adjustment.description.clone()),
                reference: None,
            },
        )
        .await
        .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        tracing::info!(
            user_id = %user_id,
            currency = %currency,
            previous = %adjustment.previous,
            new_amount = %adjustment.new_amount,
            "Balance adjusted"
        );
        Ok(adjustment)
    }

    /// All four balances of a user on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn sheet_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
    ) -> Result<BalanceSheet, DbErr> {
        let mut rows = Vec::with_capacity(Currency::ALL.len());
        for currency in Currency::ALL {
            if let Some(balance) = Self::find_in(conn, user_id, currency).await? {
                rows.push(balance);
            }
        }
        Ok(BalanceSheet::from_rows(user_id, &rows))
    }

    /// A single balance row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Balance>, DbErr> {
        let uid = user_id.into_inner();
        balance_table!(currency, table => {
            let row = table::Entity::find()
                .filter(table::Column::UserId.eq(uid))
                .one(conn)
                .await?;
            Ok(row.map(|m| Balance {
                currency,
                amount: m.balance,
                updated_at: Some(m.updated_at.with_timezone(&Utc)),
            }))
        })
    }

    /// A single balance row, locked until the surrounding transaction ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_for_update_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Balance>, DbErr> {
        let uid = user_id.into_inner();
        balance_table!(currency, table => {
            let row = table::Entity::find()
                .filter(table::Column::UserId.eq(uid))
                .lock_exclusive()
                .one(conn)
                .await?;
            Ok(row.map(|m| Balance {
                currency,
                amount: m.balance,
                updated_at: Some(m.updated_at.with_timezone(&Utc)),
            }))
        })
    }

    /// Writes `amount` as the user's balance, creating the row if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn upsert_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<(), DbErr> {
        let uid = user_id.into_inner();
        let now: DateTimeWithTimeZone = Utc::now().into();
        balance_table!(currency, table => {
            table::Entity::insert(table::ActiveModel {
                id: Set(Uuid::now_v7()),
                user_id: Set(uid),
                balance: Set(amount),
                updated_at: Set(now),
            })
            .on_conflict(
                OnConflict::column(table::Column::UserId)
                    .update_columns([table::Column::Balance, table::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
            Ok(())
        })
    }

    /// Creates a zero balance row unless one exists.
    ///
    /// Returns whether a row was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn create_zero_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
        currency: Currency,
    ) -> Result<bool, DbErr> {
        let uid = user_id.into_inner();
        let now: DateTimeWithTimeZone = Utc::now().into();
        balance_table!(currency, table => {
            let inserted = table::Entity::insert(table::ActiveModel {
                id: Set(Uuid::now_v7()),
                user_id: Set(uid),
                balance: Set(Decimal::ZERO),
                updated_at: Set(now),
            })
            .on_conflict(OnConflict::column(table::Column::UserId).do_nothing().to_owned())
            .exec_without_returning(conn)
            .await?;
            Ok(inserted > 0)
        })
    }
}
