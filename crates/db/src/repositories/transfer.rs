//! Transfer repository: requests, scoped listing and review.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use meridian_core::access::AccessScope;
use meridian_core::balance::HistoryKind;
use meridian_core::transfer::{
    Transfer, TransferDecision, TransferError, TransferRequest, TransferStatus, ensure_funds,
    review_target, validate_request,
};
use meridian_shared::types::{PageRequest, TransferId, UserId};

use super::balance::BalanceRepository;
use super::history::{HistoryRepository, NewHistoryRow};
use crate::entities::transfers;
use crate::scope::ScopedSelect;

fn db_err(err: DbErr) -> TransferError {
    TransferError::Database(err.to_string())
}

impl TryFrom<transfers::Model> for Transfer {
    type Error = TransferError;

    fn try_from(m: transfers::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TransferId::from_uuid(m.id),
            user_id: UserId::from_uuid(m.user_id),
            currency: m.currency.parse().map_err(TransferError::UnknownValue)?,
            amount: m.amount,
            destination: m.destination,
            status: m.status.parse()?,
            reviewed_by: m.reviewed_by.map(UserId::from_uuid),
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        })
    }
}

/// Reference on the withdrawal history row of a completed transfer.
#[must_use]
pub fn withdrawal_reference(id: TransferId) -> String {
    format!("transfer:{id}")
}

/// Transfer repository.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    db: Arc<DatabaseConnection>,
}

impl TransferRepository {
    /// Creates a new transfer repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a pending transfer after checking the current balance.
    ///
    /// The balance is checked again when the transfer is completed.
    ///
    /// # Errors
    ///
    /// Returns a validation error, `InsufficientFunds`, or a database error.
    pub async fn create(
        &self,
        user_id: UserId,
        request: &TransferRequest,
    ) -> Result<Transfer, TransferError> {
        validate_request(request)?;

        let available = BalanceRepository::find_in(self.db.as_ref(), user_id, request.currency)
            .await
            .map_err(db_err)?
            .map_or(Decimal::ZERO, |b| b.amount);
        ensure_funds(request.currency, available, request.amount)?;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = transfers::ActiveModel {
            id: Set(TransferId::new().into_inner()),
            user_id: Set(user_id.into_inner()),
            currency: Set(request.currency.code().to_string()),
            amount: Set(request.amount.normalize()),
            destination: Set(request.destination.trim().to_string()),
            status: Set(TransferStatus::Pending.as_str().to_string()),
            reviewed_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_err)?;

        tracing::info!(user_id = %user_id, transfer_id = %model.id, "Transfer requested");
        Transfer::try_from(model)
    }

    /// A user's transfers, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transfer>, TransferError> {
        transfers::Entity::find()
            .filter(transfers::Column::UserId.eq(user_id.into_inner()))
            .order_by_desc(transfers::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Transfer::try_from)
            .collect()
    }

    /// Transfers of users in `scope`, optionally by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_scoped(
        &self,
        scope: &AccessScope,
        status: Option<TransferStatus>,
        page: &PageRequest,
    ) -> Result<(Vec<Transfer>, u64), TransferError> {
        let mut query = transfers::Entity::find().scoped(transfers::Column::UserId, scope);
        if let Some(status) = status {
            query = query.filter(transfers::Column::Status.eq(status.as_str()));
        }
        let total = query.clone().count(self.db.as_ref()).await.map_err(db_err)?;
        let rows = query
            .order_by_asc(transfers::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        let transfers = rows
            .into_iter()
            .map(Transfer::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((transfers, total))
    }

    /// Finds a transfer.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::NotFound` when it does not exist.
    pub async fn get(&self, id: TransferId) -> Result<Transfer, TransferError> {
        transfers::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(TransferError::NotFound(id))
            .and_then(Transfer::try_from)
    }

    /// Completes or rejects a pending transfer. The caller checks the owner
    /// is in scope.
    ///
    /// Completion debits the balance and writes a withdrawal row in the same
    /// transaction, with both rows locked.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotPending`, `InsufficientFunds` or a database
    /// error; nothing is written on failure.
    pub async fn review(
        &self,
        id: TransferId,
        decision: TransferDecision,
        reviewer: UserId,
    ) -> Result<Transfer, TransferError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let row = transfers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or(TransferError::NotFound(id))?;
        let transfer = Transfer::try_from(row.clone())?;
        let target = review_target(transfer.status, decision)?;

        if target == TransferStatus::Completed {
            let available =
                BalanceRepository::find_for_update_in(&txn, transfer.user_id, transfer.currency)
                    .await
                    .map_err(db_err)?
                    .map_or(Decimal::ZERO, |b| b.amount);
            ensure_funds(transfer.currency, available, transfer.amount)?;

            BalanceRepository::upsert_in(
                &txn,
                transfer.user_id,
                transfer.currency,
                available - transfer.amount,
            )
            .await
            .map_err(db_err)?;
            HistoryRepository::record_in(
                &txn,
                NewHistoryRow {
                    user_id: transfer.user_id,
                    kind: HistoryKind::Withdrawal,
                    currency: transfer.currency,
                    amount: -transfer.amount,
                    description: Some(format!("Transfer to {}", transfer.destination)),
                    reference: Some(withdrawal_reference(id)),
                },
            )
            .await
            .map_err(db_err)?;
        }

        let mut active = row.into_active_model();
        active.status = Set(target.as_str().to_string());
        active.reviewed_by = Set(Some(reviewer.into_inner()));
        active.updated_at = Set(Utc::now().into());
        let saved = active.update(&txn).await.map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        tracing::info!(transfer_id = %id, reviewer = %reviewer, status = %target, "Transfer reviewed");
        Transfer::try_from(saved)
    }
}
