//! Entity re-exports.

pub use super::cad_balances::Entity as CadBalances;
pub use super::chat_messages::Entity as ChatMessages;
pub use super::chat_sessions::Entity as ChatSessions;
pub use super::euro_balances::Entity as EuroBalances;
pub use super::kyc_verifications::Entity as KycVerifications;
pub use super::newcrypto_balances::Entity as NewcryptoBalances;
pub use super::taxes::Entity as Taxes;
pub use super::transaction_history::Entity as TransactionHistory;
pub use super::transfers::Entity as Transfers;
pub use super::usd_balances::Entity as UsdBalances;
pub use super::user_assignments::Entity as UserAssignments;
pub use super::user_messages::Entity as UserMessages;
pub use super::user_presence::Entity as UserPresence;
pub use super::users::Entity as Users;
