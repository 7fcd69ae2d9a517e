//! Row, plan and report types for the legacy import.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meridian_shared::types::UserId;

use crate::tax::{TaxKind, TaxStatus};

/// One row of the legacy spreadsheet. Missing columns read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyRow {
    /// Legacy user UUID.
    pub uuid: String,
    /// Email.
    pub email: String,
    /// USD balance.
    pub balance: String,
    /// Lifetime deposits.
    pub total_deposits: String,
    /// Tax owed.
    pub taxes_due: String,
    /// Tax paid.
    pub taxes_paid: String,
    /// Account creation timestamp.
    pub created_at: String,
}

impl LegacyRow {
    /// Key rows are deduplicated on: the uuid, else the lowercased email.
    ///
    /// Rows with neither value have no key and are never treated as duplicates.
    #[must_use]
    pub fn dedupe_key(&self) -> Option<String> {
        let uuid = self.uuid.trim();
        if !uuid.is_empty() {
            return Some(uuid.to_ascii_lowercase());
        }
        let email = self.email.trim();
        if email.is_empty() {
            None
        } else {
            Some(email.to_lowercase())
        }
    }
}

/// A line of the skip log CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEntry {
    /// UUID as it appeared in the input.
    pub uuid: String,
    /// Email as it appeared in the input.
    pub email: String,
    /// Why the row was skipped.
    pub reason: String,
}

impl SkipEntry {
    /// Builds an entry for `row`.
    #[must_use]
    pub fn for_row(row: &LegacyRow, reason: &SkipReason) -> Self {
        Self {
            uuid: row.uuid.clone(),
            email: row.email.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Why a row could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither uuid nor email matched the auth directory.
    UserNotFound,
    /// An amount column did not parse or was negative.
    InvalidAmount {
        /// Column name.
        column: &'static str,
        /// Raw value.
        value: String,
    },
    /// The CSV record itself could not be read.
    MalformedRecord(String),
    /// A ledger write failed after earlier writes for the row succeeded.
    WriteFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserNotFound => f.write_str("user not found"),
            Self::InvalidAmount { column, value } => write!(f, "invalid {column}: {value:?}"),
            Self::MalformedRecord(msg) => write!(f, "malformed record: {msg}"),
            Self::WriteFailed(msg) => write!(f, "write failed: {msg}"),
        }
    }
}

/// A legacy deposit, inserted once per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    /// Owner.
    pub user_id: UserId,
    /// Amount in USD.
    pub amount: Decimal,
    /// Deterministic reference, unique in `TransactionHistory`.
    pub reference: String,
}

impl DepositRecord {
    /// Reference key for a user's legacy USD deposit.
    #[must_use]
    pub fn reference_for(user_id: UserId) -> String {
        format!("legacy:USD:{user_id}")
    }
}

/// A legacy tax row, upserted on `payment_reference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxEntry {
    /// Owner.
    pub user_id: UserId,
    /// Inferred tax year.
    pub tax_year: i32,
    /// Due or paid.
    pub kind: TaxKind,
    /// Amount in USD.
    pub amount: Decimal,
    /// Deterministic reference, unique in `taxes`.
    pub payment_reference: String,
}

impl TaxEntry {
    /// Builds an entry with its deterministic reference.
    #[must_use]
    pub fn new(user_id: UserId, tax_year: i32, kind: TaxKind, amount: Decimal) -> Self {
        Self {
            user_id,
            tax_year,
            kind,
            amount,
            payment_reference: format!("legacy-tax:{user_id}:{tax_year}:{}", kind.as_str()),
        }
    }

    /// Status the row is written with.
    #[must_use]
    pub const fn status(&self) -> TaxStatus {
        self.kind.initial_status()
    }
}

/// Everything a resolved row will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    /// Resolved user.
    pub user_id: UserId,
    /// USD balance to upsert.
    pub balance: Decimal,
    /// Deposit to insert if absent.
    pub deposit: Option<DepositRecord>,
    /// Tax rows to upsert.
    pub taxes: Vec<TaxEntry>,
}

/// Run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Count planned writes without touching the sink.
    pub dry_run: bool,
    /// Suppress per-row logs.
    pub quiet: bool,
    /// Progress log interval in rows, 0 disables.
    pub log_every: u64,
    /// Year used when `created_at` is missing or unreadable.
    pub fallback_year: i32,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Records read from the input.
    pub rows_read: u64,
    /// Rows whose writes all succeeded (or were planned, in dry run).
    pub processed: u64,
    /// Later occurrences of an already seen key.
    pub duplicates: u64,
    /// Rows appended to the skip log.
    pub skipped: u64,
    /// USD balances upserted.
    pub balances_upserted: u64,
    /// Zero balances created for the other currencies.
    pub balances_created: u64,
    /// Deposit rows inserted.
    pub deposits_inserted: u64,
    /// Deposits skipped because the reference already existed.
    pub deposits_existing: u64,
    /// Tax rows upserted.
    pub tax_rows_upserted: u64,
}
