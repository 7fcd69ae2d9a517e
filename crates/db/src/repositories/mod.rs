//! Repository implementations for database access.
//!
//! Each repository holds a shared `Arc<DatabaseConnection>`. Functions suffixed
//! `_in` take any `ConnectionTrait` so they compose inside a transaction or
//! an `RlsConnection`.

pub mod access;
pub mod balance;
pub mod chat;
pub mod history;
pub mod kyc;
pub mod legacy;
pub mod message;
pub mod tax;
pub mod transfer;
pub mod user;

pub use access::AccessRepository;
pub use balance::BalanceRepository;
pub use chat::ChatRepository;
pub use history::{HistoryRepository, NewHistoryRow};
pub use kyc::KycRepository;
pub use legacy::LegacyLedger;
pub use message::MessageRepository;
pub use tax::TaxRepository;
pub use transfer::TransferRepository;
pub use user::{UserError, UserProfile, UserRepository};

/// Takes the transaction log once every repository built on `db` is gone.
#[cfg(test)]
pub(crate) fn transaction_log(
    db: std::sync::Arc<sea_orm::DatabaseConnection>,
) -> Vec<sea_orm::Transaction> {
    std::sync::Arc::into_inner(db)
        .expect("connection still shared")
        .into_transaction_log()
}
