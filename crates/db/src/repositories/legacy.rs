//! `LedgerSink` used by the legacy spreadsheet import.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DbErr};

use meridian_core::balance::HistoryKind;
use meridian_core::import::{DepositRecord, ImportError, LedgerSink, TaxEntry};
use meridian_shared::types::{Currency, UserId};

use super::balance::BalanceRepository;
use super::history::{HistoryRepository, NewHistoryRow};
use super::tax::TaxRepository;

/// Description on imported deposit rows.
pub const LEGACY_DEPOSIT_DESCRIPTION: &str = "Legacy deposits";

fn sink_err(err: DbErr) -> ImportError {
    ImportError::Sink(err.to_string())
}

/// Writes imported rows straight to the database. Every write is keyed.
#[derive(Debug, Clone)]
pub struct LegacyLedger {
    db: Arc<DatabaseConnection>,
}

impl LegacyLedger {
    /// Creates a new ledger sink.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl LedgerSink for LegacyLedger {
    async fn upsert_balance(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<(), ImportError> {
        BalanceRepository::upsert_in(self.db.as_ref(), user_id, currency, amount)
            .await
            .map_err(sink_err)
    }

    async fn ensure_balance(&self, user_id: UserId, currency: Currency) -> Result<bool, ImportError> {
        BalanceRepository::create_zero_in(self.db.as_ref(), user_id, currency)
            .await
            .map_err(sink_err)
    }

    async fn insert_deposit(&self, deposit: &DepositRecord) -> Result<bool, ImportError> {
        HistoryRepository::record_in(
            self.db.as_ref(),
            NewHistoryRow {
                user_id: deposit.user_id,
                kind: HistoryKind::Deposit,
                currency: Currency::Usd,
                amount: deposit.amount,
                description: Some(LEGACY_DEPOSIT_DESCRIPTION.to_string()),
                reference: Some(deposit.reference.clone()),
            },
        )
        .await
        .map_err(sink_err)
    }

    async fn upsert_tax(&self, entry: &TaxEntry) -> Result<(), ImportError> {
        TaxRepository::upsert_entry_in(self.db.as_ref(), entry)
            .await
            .map_err(sink_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::transaction_log;
    use meridian_core::import::{ImportOptions, LegacyRow, SkipEntry, UserIndex, run_import};
    use meridian_shared::auth::DirectoryUser;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn affected(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_full_row_writes_every_keyed_statement() {
        let user = DirectoryUser {
            id: uuid::Uuid::now_v7(),
            email: Some("ada@example.com".into()),
        };
        let index = UserIndex::from_directory(vec![user.clone()]);
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres)
            // usd upsert, three ensures, deposit, two tax rows
            .append_exec_results([
                affected(1),
                affected(1),
                affected(0),
                affected(1),
                affected(1),
                affected(1),
                affected(1),
            ])
            .into_connection());
        let ledger = LegacyLedger::new(Arc::clone(&db));

        let row = LegacyRow {
            uuid: user.id.to_string(),
            email: "ada@example.com".into(),
            balance: "1,250.00".into(),
            total_deposits: "2000".into(),
            taxes_due: "10".into(),
            taxes_paid: "5".into(),
            created_at: "2021-06-01".into(),
        };
        let mut skipped: Vec<SkipEntry> = Vec::new();
        let report = run_import(
            vec![Ok(row)],
            &index,
            &ledger,
            &mut skipped,
            &ImportOptions {
                dry_run: false,
                quiet: true,
                log_every: 0,
                fallback_year: 2024,
            },
        )
        .await
        .unwrap();

        assert!(skipped.is_empty(), "{skipped:?}");
        assert_eq!(report.processed, 1);
        assert_eq!(report.balances_created, 2);
        assert_eq!(report.deposits_inserted, 1);
        assert_eq!(report.tax_rows_upserted, 2);

        drop(ledger);
        let sql = format!("{:?}", transaction_log(db));
        assert!(sql.contains("usd_balances"));
        assert!(sql.contains("newcrypto_balances"));
        assert!(sql.contains("legacy:USD:"));
        assert!(sql.contains(":2021:due"));
    }
}
