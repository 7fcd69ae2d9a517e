//! User repository: registration, profiles and scoped admin search.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;

use meridian_core::access::{AccessScope, RoleFlags};
use meridian_core::kyc::KycStatus;
use meridian_shared::AppError;
use meridian_shared::types::{Currency, PageRequest, UserId};

use super::balance::BalanceRepository;
use crate::entities::users;
use crate::scope::ScopedSelect;

/// User repository errors.
#[derive(Debug, Error)]
pub enum UserError {
    /// No `users` row for this id.
    #[error("user {0} not found")]
    NotFound(UserId),

    /// Stored value could not be interpreted.
    #[error("unknown user value: {0}")]
    UnknownValue(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(_) => Self::NotFound(err.to_string()),
            UserError::UnknownValue(_) => Self::Internal(err.to_string()),
            UserError::Database(e) => Self::Database(e.to_string()),
        }
    }
}

/// Public view of a `users` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// User ID.
    pub id: UserId,
    /// Email.
    pub email: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Role flags.
    #[serde(flatten)]
    pub roles: RoleFlags,
    /// KYC status.
    pub kyc_status: KycStatus,
    /// Created at.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<users::Model> for UserProfile {
    type Error = UserError;

    fn try_from(m: users::Model) -> Result<Self, Self::Error> {
        let kyc_status = m
            .kyc_status
            .parse()
            .map_err(|_| UserError::UnknownValue(m.kyc_status.clone()))?;
        Ok(Self {
            id: UserId::from_uuid(m.id),
            email: m.email,
            full_name: m.full_name,
            roles: RoleFlags {
                is_admin: m.is_admin,
                is_manager: m.is_manager,
                is_superiormanager: m.is_superiormanager,
            },
            kyc_status,
            created_at: m.created_at.with_timezone(&Utc),
        })
    }
}

/// Escapes `LIKE` wildcards and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// User repository for registration and lookups.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<UserProfile>, UserError> {
        users::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await?
            .map(UserProfile::try_from)
            .transpose()
    }

    /// Fetches a user the caller is known to exist, e.g. the token subject.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NotFound` when no row exists.
    pub async fn get(&self, id: UserId) -> Result<UserProfile, UserError> {
        self.find_by_id(id).await?.ok_or(UserError::NotFound(id))
    }

    /// Creates the `users` row for a freshly signed-up auth user together
    /// with zero balances in every currency.
    ///
    /// Safe to call twice for the same id; existing rows are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written in that case.
    pub async fn register(
        &self,
        id: UserId,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<UserProfile, UserError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let txn = self.db.begin().await?;

        users::Entity::insert(users::ActiveModel {
            id: Set(id.into_inner()),
            email: Set(email.trim().to_lowercase()),
            full_name: Set(full_name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)),
            is_admin: Set(false),
            is_manager: Set(false),
            is_superiormanager: Set(false),
            kyc_status: Set(KycStatus::NotSubmitted.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(OnConflict::column(users::Column::Id).do_nothing().to_owned())
        .exec_without_returning(&txn)
        .await?;

        for currency in Currency::ALL {
            BalanceRepository::create_zero_in(&txn, id, currency).await?;
        }

        let user = users::Entity::find_by_id(id.into_inner())
            .one(&txn)
            .await?
            .ok_or(UserError::NotFound(id))?;
        txn.commit().await?;

        tracing::info!(user_id = %id, "Registered user");
        UserProfile::try_from(user)
    }

    /// Searches users within `scope` by email or name substring.
    ///
    /// Returns the requested page and the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search(
        &self,
        scope: &AccessScope,
        term: Option<&str>,
        page: &PageRequest,
    ) -> Result<(Vec<UserProfile>, u64), UserError> {
        let mut query = users::Entity::find().scoped(users::Column::Id, scope);
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(term);
            query = query.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(users::Column::Email))).like(pattern.clone()))
                    .add(Expr::expr(Func::lower(Expr::col(users::Column::FullName))).like(pattern)),
            );
        }

        let total = query.clone().count(self.db.as_ref()).await?;
        let rows = query
            .order_by_asc(users::Column::Email)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.db.as_ref())
            .await?;

        let users = rows
            .into_iter()
            .map(UserProfile::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    /// Sets `users.kyc_status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_kyc_status_in<C: ConnectionTrait>(
        conn: &C,
        id: UserId,
        status: KycStatus,
    ) -> Result<(), DbErr> {
        users::Entity::update_many()
            .col_expr(users::Column::KycStatus, Expr::value(status.as_str()))
            .filter(users::Column::Id.eq(id.into_inner()))
            .exec(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::transaction_log;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn model(id: Uuid, kyc_status: &str) -> users::Model {
        let now: DateTimeWithTimeZone = Utc::now().into();
        users::Model {
            id,
            email: "ada@example.com".into(),
            full_name: Some("Ada".into()),
            is_admin: false,
            is_manager: true,
            is_superiormanager: false,
            kyc_status: kyc_status.into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" Ada "), "%ada%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_profile_from_model() {
        let id = Uuid::now_v7();
        let profile = UserProfile::try_from(model(id, "pending")).unwrap();
        assert_eq!(profile.id, UserId::from_uuid(id));
        assert!(profile.roles.is_manager);
        assert_eq!(profile.kyc_status, KycStatus::Pending);

        assert!(matches!(
            UserProfile::try_from(model(id, "bogus")),
            Err(UserError::UnknownValue(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_id_maps_row() {
        let id = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model(id, "approved")]])
            .into_connection();
        let repo = UserRepository::new(Arc::new(db));

        let profile = repo.find_by_id(UserId::from_uuid(id)).await.unwrap().unwrap();
        assert_eq!(profile.kyc_status, KycStatus::Approved);
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let repo = UserRepository::new(Arc::new(db));

        let id = UserId::new();
        assert!(matches!(repo.get(id).await, Err(UserError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_search_limited_to_self_finds_no_one_else() {
        let manager = UserId::new();
        let other = UserId::new();
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[BTreeMap::from([(
                    "num_items".to_string(),
                    Value::BigInt(Some(0)),
                )])]])
                .append_query_results([Vec::<users::Model>::new()])
                .into_connection(),
        );

        let (found, total) = UserRepository::new(Arc::clone(&db))
            .search(
                &AccessScope::only_self(manager),
                Some("example.com"),
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 0);

        let sql = format!("{:?}", transaction_log(db));
        assert!(sql.contains(r#"\"users\".\"id\" IN ("#), "{sql}");
        assert!(sql.contains(&manager.to_string()));
        assert!(!sql.contains(&other.to_string()));
    }
}
