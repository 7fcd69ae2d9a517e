//! Import loop tests against an in-memory ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use meridian_shared::auth::DirectoryUser;
use meridian_shared::types::{Currency, UserId};

use super::error::ImportError;
use super::reconcile::UserIndex;
use super::runner::{LedgerSink, run_import};
use super::types::{DepositRecord, ImportOptions, LegacyRow, SkipEntry, TaxEntry};

#[derive(Default)]
struct Ledger {
    balances: BTreeMap<(UserId, Currency), Decimal>,
    deposits: HashMap<String, DepositRecord>,
    taxes: HashMap<String, TaxEntry>,
    calls: usize,
}

#[derive(Default)]
struct InMemorySink {
    ledger: Mutex<Ledger>,
    fail_taxes: bool,
}

impl InMemorySink {
    fn snapshot<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        f(&self.ledger.lock().unwrap())
    }
}

impl LedgerSink for InMemorySink {
    async fn upsert_balance(
        &self,
        user_id: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<(), ImportError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls += 1;
        ledger.balances.insert((user_id, currency), amount);
        Ok(())
    }

    async fn ensure_balance(&self, user_id: UserId, currency: Currency) -> Result<bool, ImportError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls += 1;
        if ledger.balances.contains_key(&(user_id, currency)) {
            return Ok(false);
        }
        ledger.balances.insert((user_id, currency), Decimal::ZERO);
        Ok(true)
    }

    async fn insert_deposit(&self, deposit: &DepositRecord) -> Result<bool, ImportError> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls += 1;
        if ledger.deposits.contains_key(&deposit.reference) {
            return Ok(false);
        }
        ledger
            .deposits
            .insert(deposit.reference.clone(), deposit.clone());
        Ok(true)
    }

    async fn upsert_tax(&self, entry: &TaxEntry) -> Result<(), ImportError> {
        if self.fail_taxes {
            return Err(ImportError::Sink("unique violation".into()));
        }
        let mut ledger = self.ledger.lock().unwrap();
        ledger.calls += 1;
        ledger
            .taxes
            .insert(entry.payment_reference.clone(), entry.clone());
        Ok(())
    }
}

fn options() -> ImportOptions {
    ImportOptions {
        dry_run: false,
        quiet: true,
        log_every: 0,
        fallback_year: 2026,
    }
}

fn user(email: &str) -> DirectoryUser {
    DirectoryUser {
        id: Uuid::new_v4(),
        email: Some(email.into()),
    }
}

fn row(user: &DirectoryUser, balance: &str, deposits: &str, due: &str, paid: &str) -> LegacyRow {
    LegacyRow {
        uuid: user.id.to_string(),
        email: user.email.clone().unwrap_or_default(),
        balance: balance.into(),
        total_deposits: deposits.into(),
        taxes_due: due.into(),
        taxes_paid: paid.into(),
        created_at: "2023-02-14T09:00:00Z".into(),
    }
}

fn ok_rows(rows: Vec<LegacyRow>) -> Vec<Result<LegacyRow, String>> {
    rows.into_iter().map(Ok).collect()
}

#[tokio::test]
async fn test_duplicate_uuid_processed_once_without_logging() {
    let alice = user("alice@example.com");
    let index = UserIndex::from_directory([alice.clone()]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let first = row(&alice, "10", "", "", "");
    let second = row(&alice, "99", "", "", "");
    let report = run_import(ok_rows(vec![first, second]), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(report.rows_read, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.duplicates, 1);
    assert!(skipped.is_empty());
    let id = UserId::from_uuid(alice.id);
    assert_eq!(
        sink.snapshot(|l| l.balances[&(id, Currency::Usd)]),
        dec!(10)
    );
}

#[tokio::test]
async fn test_duplicate_email_with_different_case_is_skipped() {
    let alice = user("alice@example.com");
    let index = UserIndex::from_directory([alice.clone()]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let rows = vec![
        LegacyRow {
            email: "alice@example.com".into(),
            ..LegacyRow::default()
        },
        LegacyRow {
            email: "ALICE@example.com".into(),
            ..LegacyRow::default()
        },
    ];
    let report = run_import(ok_rows(rows), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.duplicates, 1);
}

#[tokio::test]
async fn test_unresolvable_row_logs_once_and_never_writes() {
    let index = UserIndex::from_directory([user("known@example.com")]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let stranger = LegacyRow {
        uuid: Uuid::new_v4().to_string(),
        email: "nobody@example.com".into(),
        balance: "50".into(),
        ..LegacyRow::default()
    };
    let report = run_import(ok_rows(vec![stranger.clone()]), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(
        skipped,
        vec![SkipEntry {
            uuid: stranger.uuid,
            email: stranger.email,
            reason: "user not found".into(),
        }]
    );
    assert_eq!(sink.snapshot(|l| l.calls), 0);
}

#[tokio::test]
async fn test_full_row_writes_every_table() {
    let bob = user("bob@example.com");
    let index = UserIndex::from_directory([bob.clone()]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let report = run_import(
        ok_rows(vec![row(&bob, "$1,000.00", "1500", "120.5", "80")]),
        &index,
        &sink,
        &mut skipped,
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.balances_upserted, 1);
    assert_eq!(report.balances_created, 3);
    assert_eq!(report.deposits_inserted, 1);
    assert_eq!(report.tax_rows_upserted, 2);

    let id = UserId::from_uuid(bob.id);
    sink.snapshot(|l| {
        assert_eq!(l.balances[&(id, Currency::Usd)], dec!(1000));
        for currency in [Currency::Euro, Currency::Cad, Currency::NewCrypto] {
            assert_eq!(l.balances[&(id, currency)], Decimal::ZERO);
        }
        assert_eq!(l.deposits[&format!("legacy:USD:{id}")].amount, dec!(1500));
        assert!(l.taxes.contains_key(&format!("legacy-tax:{id}:2023:due")));
        assert!(l.taxes.contains_key(&format!("legacy-tax:{id}:2023:paid")));
    });
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let carol = user("carol@example.com");
    let index = UserIndex::from_directory([carol.clone()]);
    let sink = InMemorySink::default();
    let rows = vec![row(&carol, "5", "20", "3", "1")];

    let mut skipped: Vec<SkipEntry> = Vec::new();
    run_import(ok_rows(rows.clone()), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();
    let second = run_import(ok_rows(rows), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(second.deposits_inserted, 0);
    assert_eq!(second.deposits_existing, 1);
    assert_eq!(second.balances_created, 0);
    sink.snapshot(|l| {
        assert_eq!(l.deposits.len(), 1);
        assert_eq!(l.taxes.len(), 2);
        assert_eq!(l.balances.len(), 4);
    });
    assert!(skipped.is_empty());
}

#[tokio::test]
async fn test_dry_run_counts_without_writing() {
    let dave = user("dave@example.com");
    let index = UserIndex::from_directory([dave.clone()]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let opts = ImportOptions {
        dry_run: true,
        ..options()
    };
    let report = run_import(
        ok_rows(vec![row(&dave, "1", "2", "3", "")]),
        &index,
        &sink,
        &mut skipped,
        &opts,
    )
    .await
    .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.balances_upserted, 1);
    assert_eq!(report.deposits_inserted, 1);
    assert_eq!(report.tax_rows_upserted, 1);
    assert_eq!(sink.snapshot(|l| l.calls), 0);
}

#[tokio::test]
async fn test_malformed_amount_and_record_go_to_skip_log() {
    let erin = user("erin@example.com");
    let index = UserIndex::from_directory([erin.clone()]);
    let sink = InMemorySink::default();
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let rows = vec![
        Ok(row(&erin, "twelve", "", "", "")),
        Err("found record with 3 fields, expected 7".to_string()),
    ];
    let report = run_import(rows, &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(report.skipped, 2);
    assert!(skipped[0].reason.starts_with("invalid balance"));
    assert!(skipped[1].reason.starts_with("malformed record"));
    assert_eq!(sink.snapshot(|l| l.calls), 0);
}

#[tokio::test]
async fn test_sink_failure_is_row_scoped() {
    let frank = user("frank@example.com");
    let gina = user("gina@example.com");
    let index = UserIndex::from_directory([frank.clone(), gina.clone()]);
    let sink = InMemorySink {
        fail_taxes: true,
        ..InMemorySink::default()
    };
    let mut skipped: Vec<SkipEntry> = Vec::new();

    let rows = vec![row(&frank, "1", "", "5", ""), row(&gina, "2", "", "", "")];
    let report = run_import(ok_rows(rows), &index, &sink, &mut skipped, &options())
        .await
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(skipped[0].email, "frank@example.com");
    assert!(skipped[0].reason.contains("unique violation"));
}
