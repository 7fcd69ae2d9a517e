//! Tax repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use meridian_core::import::TaxEntry;
use meridian_core::tax::{TaxError, TaxRecord, TaxUpdate, validate_update};
use meridian_shared::types::{TaxId, UserId};

use crate::entities::taxes;

fn db_err(err: DbErr) -> TaxError {
    TaxError::Database(err.to_string())
}

impl TryFrom<taxes::Model> for TaxRecord {
    type Error = TaxError;

    fn try_from(m: taxes::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TaxId::from_uuid(m.id),
            user_id: UserId::from_uuid(m.user_id),
            tax_year: m.tax_year,
            kind: m.kind.parse()?,
            amount: m.amount,
            status: m.status.parse()?,
            payment_reference: m.payment_reference,
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        })
    }
}

/// Tax repository.
#[derive(Debug, Clone)]
pub struct TaxRepository {
    db: Arc<DatabaseConnection>,
}

impl TaxRepository {
    /// Creates a new tax repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// A user's tax rows, latest year first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<TaxRecord>, TaxError> {
        Self::list_for_user_in(self.db.as_ref(), user_id).await
    }

    /// A user's tax rows on `conn`, latest year first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_user_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
    ) -> Result<Vec<TaxRecord>, TaxError> {
        taxes::Entity::find()
            .filter(taxes::Column::UserId.eq(user_id.into_inner()))
            .order_by_desc(taxes::Column::TaxYear)
            .order_by_asc(taxes::Column::Kind)
            .all(conn)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(TaxRecord::try_from)
            .collect()
    }

    /// Finds a tax row.
    ///
    /// # Errors
    ///
    /// Returns `TaxError::NotFound` when the row does not exist.
    pub async fn get(&self, id: TaxId) -> Result<TaxRecord, TaxError> {
        taxes::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(TaxError::NotFound(id))
            .and_then(TaxRecord::try_from)
    }

    /// Applies an admin edit. The caller checks the owner is in scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error before touching the database, or
    /// `TaxError::NotFound`.
    pub async fn update(&self, id: TaxId, update: &TaxUpdate) -> Result<TaxRecord, TaxError> {
        validate_update(update)?;

        let row = taxes::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(TaxError::NotFound(id))?;

        let mut active = row.into_active_model();
        if let Some(amount) = update.amount {
            active.amount = Set(amount.normalize());
        }
        if let Some(status) = update.status {
            active.status = Set(status.as_str().to_string());
        }
        active.updated_at = Set(Utc::now().into());

        let saved = active.update(self.db.as_ref()).await.map_err(db_err)?;
        tracing::info!(tax_id = %id, "Tax row updated");
        TaxRecord::try_from(saved)
    }

    /// Inserts or refreshes an imported row keyed by its payment reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn upsert_entry_in<C: ConnectionTrait>(conn: &C, entry: &TaxEntry) -> Result<(), DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        taxes::Entity::insert(taxes::ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(entry.user_id.into_inner()),
            tax_year: Set(entry.tax_year),
            kind: Set(entry.kind.as_str().to_string()),
            amount: Set(entry.amount),
            status: Set(entry.status().as_str().to_string()),
            payment_reference: Set(Some(entry.payment_reference.clone())),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(taxes::Column::PaymentReference)
                .update_columns([
                    taxes::Column::TaxYear,
                    taxes::Column::Amount,
                    taxes::Column::Status,
                    taxes::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::transaction_log;
    use meridian_core::tax::{TaxKind, TaxStatus};
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn model(id: Uuid) -> taxes::Model {
        let now: DateTimeWithTimeZone = Utc::now().into();
        taxes::Model {
            id,
            user_id: Uuid::now_v7(),
            tax_year: 2023,
            kind: "due".into(),
            amount: dec!(120),
            status: "outstanding".into(),
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_invalid_update_never_queries() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let repo = TaxRepository::new(Arc::clone(&db));
        let result = repo.update(TaxId::new(), &TaxUpdate::default()).await;
        assert!(matches!(result, Err(TaxError::EmptyUpdate)));
        drop(repo);
        assert!(transaction_log(db).is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<taxes::Model>::new()])
            .into_connection();
        let id = TaxId::new();
        let result = TaxRepository::new(Arc::new(db))
            .update(
                id,
                &TaxUpdate {
                    amount: Some(dec!(1)),
                    status: None,
                },
            )
            .await;
        assert!(matches!(result, Err(TaxError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_update_settles_row() {
        let id = Uuid::now_v7();
        let mut settled = model(id);
        settled.status = "settled".into();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model(id)]])
            .append_query_results([vec![settled]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let record = TaxRepository::new(Arc::new(db))
            .update(
                TaxId::from_uuid(id),
                &TaxUpdate {
                    amount: None,
                    status: Some(TaxStatus::Settled),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.status, TaxStatus::Settled);
        assert_eq!(record.kind, TaxKind::Due);
    }

    #[tokio::test]
    async fn test_import_upsert_is_keyed_by_reference() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let entry = TaxEntry::new(UserId::new(), 2022, TaxKind::Paid, dec!(50));
        TaxRepository::upsert_entry_in(&db, &entry).await.unwrap();

        let sql = format!("{:?}", db.into_transaction_log());
        assert!(sql.contains("ON CONFLICT"));
        assert!(sql.contains("payment_reference"));
        assert!(sql.contains(&entry.payment_reference));
    }
}
