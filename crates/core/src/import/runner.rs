//! Sequential import loop over the ledger ports.

use std::collections::HashSet;
use std::future::Future;

use tracing::{debug, info, warn};

use meridian_shared::HostedAuthClient;
use meridian_shared::auth::DirectoryUser;
use meridian_shared::types::{Currency, UserId};
use rust_decimal::Decimal;

use super::error::ImportError;
use super::reconcile::{UserIndex, plan_row};
use super::types::{
    DepositRecord, ImportOptions, ImportReport, LegacyRow, RowPlan, SkipEntry, SkipReason,
    TaxEntry,
};

/// Source of hosted-auth users.
pub trait AuthDirectory: Send + Sync {
    /// Every user in the directory.
    fn list_users(&self) -> impl Future<Output = Result<Vec<DirectoryUser>, ImportError>> + Send;
}

impl AuthDirectory for HostedAuthClient {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, ImportError> {
        self.list_all_users()
            .await
            .map_err(|e| ImportError::Directory(e.to_string()))
    }
}

/// Idempotent ledger writes performed by the import.
///
/// Implemented by the db crate.
pub trait LedgerSink: Send + Sync {
    /// Sets a user's balance in `currency`, creating the row if needed.
    fn upsert_balance(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> impl Future<Output = Result<(), ImportError>> + Send;

    /// Creates a zero balance row if none exists. Returns whether a row was created.
    fn ensure_balance(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> impl Future<Output = Result<bool, ImportError>> + Send;

    /// Inserts the deposit unless its reference exists. Returns whether it was inserted.
    fn insert_deposit(
        &self,
        deposit: &DepositRecord,
    ) -> impl Future<Output = Result<bool, ImportError>> + Send;

    /// Inserts or updates the tax row keyed on its payment reference.
    fn upsert_tax(&self, entry: &TaxEntry) -> impl Future<Output = Result<(), ImportError>> + Send;
}

/// Destination for skipped rows.
pub trait SkipLog {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::SkipLog` if the entry cannot be persisted.
    fn record(&mut self, entry: SkipEntry) -> Result<(), ImportError>;
}

impl SkipLog for Vec<SkipEntry> {
    fn record(&mut self, entry: SkipEntry) -> Result<(), ImportError> {
        self.push(entry);
        Ok(())
    }
}

/// Writes counted for one row.
#[derive(Default)]
struct RowWrites {
    balances_upserted: u64,
    balances_created: u64,
    deposits_inserted: u64,
    deposits_existing: u64,
    tax_rows_upserted: u64,
}

impl RowWrites {
    fn planned(plan: &RowPlan) -> Self {
        Self {
            balances_upserted: 1,
            balances_created: 0,
            deposits_inserted: u64::from(plan.deposit.is_some()),
            deposits_existing: 0,
            tax_rows_upserted: plan.taxes.len() as u64,
        }
    }

    fn add_to(&self, report: &mut ImportReport) {
        report.balances_upserted += self.balances_upserted;
        report.balances_created += self.balances_created;
        report.deposits_inserted += self.deposits_inserted;
        report.deposits_existing += self.deposits_existing;
        report.tax_rows_upserted += self.tax_rows_upserted;
    }
}

async fn apply_plan<S: LedgerSink>(sink: &S, plan: &RowPlan, writes: &mut RowWrites) -> Result<(), ImportError> {
    sink.upsert_balance(plan.user_id, Currency::Usd, plan.balance).await?;
    writes.balances_upserted += 1;

    for currency in Currency::ALL.into_iter().filter(|c| *c != Currency::Usd) {
        if sink.ensure_balance(plan.user_id, currency).await? {
            writes.balances_created += 1;
        }
    }

    if let Some(deposit) = &plan.deposit {
        if sink.insert_deposit(deposit).await? {
            writes.deposits_inserted += 1;
        } else {
            writes.deposits_existing += 1;
        }
    }

    for entry in &plan.taxes {
        sink.upsert_tax(entry).await?;
        writes.tax_rows_upserted += 1;
    }
    Ok(())
}

/// Imports `rows` in order.
///
/// Row-level failures go to `skip_log` and the loop continues. Writes that
/// succeeded before a failure within the same row are kept; re-running is
/// safe because every write is keyed.
///
/// # Errors
///
/// Returns `ImportError::SkipLog` if a skipped row cannot be recorded.
pub async fn run_import<I, S, L>(
    rows: I,
    index: &UserIndex,
    sink: &S,
    skip_log: &mut L,
    options: &ImportOptions,
) -> Result<ImportReport, ImportError>
where
    I: IntoIterator<Item = Result<LegacyRow, String>>,
    S: LedgerSink,
    L: SkipLog,
{
    let mut report = ImportReport::default();
    let mut seen: HashSet<String> = HashSet::new();

    for record in rows {
        report.rows_read += 1;
        if options.log_every > 0 && report.rows_read % options.log_every == 0 {
            info!(rows_read = report.rows_read, processed = report.processed, skipped = report.skipped, "Import progress");
        }

        let row = match record {
            Ok(row) => row,
            Err(msg) => {
                let reason = SkipReason::MalformedRecord(msg);
                skip(&LegacyRow::default(), &reason, skip_log, &mut report, options)?;
                continue;
            }
        };

        if let Some(key) = row.dedupe_key() {
            if !seen.insert(key) {
                report.duplicates += 1;
                continue;
            }
        }

        let plan = match plan_row(&row, index, options.fallback_year) {
            Ok(plan) => plan,
            Err(reason) => {
                skip(&row, &reason, skip_log, &mut report, options)?;
                continue;
            }
        };

        if options.dry_run {
            RowWrites::planned(&plan).add_to(&mut report);
            report.processed += 1;
            if !options.quiet {
                debug!(user_id = %plan.user_id, "Dry run: row planned");
            }
            continue;
        }

        let mut writes = RowWrites::default();
        let outcome = apply_plan(sink, &plan, &mut writes).await;
        writes.add_to(&mut report);
        match outcome {
            Ok(()) => {
                report.processed += 1;
                if !options.quiet {
                    info!(user_id = %plan.user_id, email = %row.email, "Row imported");
                }
            }
            Err(e) => {
                let reason = SkipReason::WriteFailed(e.to_string());
                skip(&row, &reason, skip_log, &mut report, options)?;
            }
        }
    }

    info!(
        rows_read = report.rows_read,
        processed = report.processed,
        duplicates = report.duplicates,
        skipped = report.skipped,
        dry_run = options.dry_run,
        "Import finished"
    );
    Ok(report)
}

fn skip<L: SkipLog>(
    row: &LegacyRow,
    reason: &SkipReason,
    skip_log: &mut L,
    report: &mut ImportReport,
    options: &ImportOptions,
) -> Result<(), ImportError> {
    if !options.quiet {
        warn!(uuid = %row.uuid, email = %row.email, %reason, "Row skipped");
    }
    skip_log.record(SkipEntry::for_row(row, reason))?;
    report.skipped += 1;
    Ok(())
}
