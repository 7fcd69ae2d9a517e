//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Repositories, including the `AccessDirectory` and `LedgerSink` ports
//! - `ScopedSelect`, which applies an `AccessScope` to admin queries
//! - Database migrations and row-level security helpers

pub mod entities;
pub mod migration;
pub mod repositories;
pub mod rls;
pub mod scope;

pub use repositories::{
    AccessRepository, BalanceRepository, ChatRepository, HistoryRepository, KycRepository,
    LegacyLedger, MessageRepository, TaxRepository, TransferRepository, UserProfile, UserRepository,
};
pub use scope::ScopedSelect;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Establishes a pooled connection with explicit pool bounds.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with_pool(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(max_connections)
        .min_connections(min_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}
