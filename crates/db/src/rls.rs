//! Row-Level Security (RLS) context management.
//!
//! Runs queries as the `authenticated` role with the caller's JWT claims set,
//! so the policies created by the row-level security migration apply exactly
//! as they do for hosted clients.
//!
//! # Usage
//!
//! ```ignore
//! use meridian_db::rls::RlsExt;
//!
//! let rls = db.with_rls(user_id).await?;
//! let taxes = TaxRepository::list_for_user_in(rls.transaction(), user_id).await?;
//! rls.commit().await?;
//! ```

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, Statement,
    TransactionTrait,
};

use meridian_shared::types::UserId;

/// Role the policies are written for.
pub const RLS_ROLE: &str = "authenticated";

/// A transaction that runs under a user's RLS context.
///
/// The claims and role are set with `SET LOCAL` semantics and vanish when the
/// transaction ends.
pub struct RlsConnection {
    txn: DatabaseTransaction,
}

impl RlsConnection {
    /// Begins a transaction acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or the RLS
    /// context cannot be set.
    pub async fn new(db: &DatabaseConnection, user_id: UserId) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        set_rls_context(&txn, user_id).await?;
        Ok(Self { txn })
    }

    /// The underlying transaction. Every query through it is subject to RLS.
    #[must_use]
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub async fn commit(self) -> Result<(), DbErr> {
        self.txn.commit().await
    }

    /// Rolls back the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    pub async fn rollback(self) -> Result<(), DbErr> {
        self.txn.rollback().await
    }
}

/// Extension trait for `DatabaseConnection` to easily create RLS-enabled connections.
#[async_trait::async_trait]
pub trait RlsExt {
    /// Begins a transaction acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the RLS connection cannot be created.
    async fn with_rls(&self, user_id: UserId) -> Result<RlsConnection, DbErr>;
}

#[async_trait::async_trait]
impl RlsExt for DatabaseConnection {
    async fn with_rls(&self, user_id: UserId) -> Result<RlsConnection, DbErr> {
        RlsConnection::new(self, user_id).await
    }
}

/// JSON claims placed in `request.jwt.claims`.
#[must_use]
pub fn claims_json(user_id: UserId) -> String {
    serde_json::json!({ "sub": user_id.to_string(), "role": RLS_ROLE }).to_string()
}

/// Sets the RLS context on an existing transaction.
///
/// # Errors
///
/// Returns an error if the context cannot be set.
pub async fn set_rls_context(txn: &DatabaseTransaction, user_id: UserId) -> Result<(), DbErr> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT set_config('request.jwt.claims', $1, true)",
        [claims_json(user_id).into()],
    ))
    .await?;
    txn.execute_unprepared(&format!("SET LOCAL ROLE {RLS_ROLE}"))
        .await?;
    Ok(())
}
