//! `SeaORM` entities, one module per table.

pub mod prelude;

pub mod cad_balances;
pub mod chat_messages;
pub mod chat_sessions;
pub mod euro_balances;
pub mod kyc_verifications;
pub mod newcrypto_balances;
pub mod taxes;
pub mod transaction_history;
pub mod transfers;
pub mod usd_balances;
pub mod user_assignments;
pub mod user_messages;
pub mod user_presence;
pub mod users;
