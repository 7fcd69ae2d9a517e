//! Legacy spreadsheet importer.
//!
//! Reads the legacy CSV, matches each row to a hosted-auth user and writes
//! balances, lifetime deposits and tax rows. Safe to re-run.
//!
//! Environment:
//!   DATABASE_URL, AUTH_URL, SERVICE_ROLE_KEY   required
//!   CSV_PATH        input file (default `legacy_users.csv`)
//!   SKIP_LOG_PATH   skipped rows (default `import_skipped.csv`)
//!   DRY_RUN, QUIET  `1`, `true`, `yes` or `on` to enable
//!   LOG_EVERY       progress interval in rows (default 50, 0 disables)

mod skip_log;

use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Utc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meridian_core::import::{AuthDirectory, ImportOptions, LegacyRow, UserIndex, run_import};
use meridian_db::{LegacyLedger, connect};
use meridian_shared::{HostedAuthClient, ImportConfig};

use skip_log::CsvSkipLog;

/// Exit code when the directory, database or skip log is unavailable.
/// Input problems (missing CSV or credentials) exit with 1.
const SETUP_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meridian=info,importer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ImportConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Missing credentials");
            return ExitCode::FAILURE;
        }
    };
    if !config.csv_path.is_file() {
        error!(path = %config.csv_path.display(), "CSV file not found");
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "Import aborted");
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

async fn run(config: &ImportConfig) -> anyhow::Result<()> {
    let auth = HostedAuthClient::new(&config.auth_url, &config.service_role_key)
        .with_service_role_key(&config.service_role_key);
    let index = UserIndex::from_directory(auth.list_users().await?);
    info!(users = index.len(), "Loaded auth directory");

    let db = connect(&config.database_url).await?;
    let sink = LegacyLedger::new(Arc::new(db));

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&config.csv_path)
        .with_context(|| format!("failed to open {}", config.csv_path.display()))?;
    let rows = reader
        .deserialize::<LegacyRow>()
        .map(|record| record.map_err(|e| e.to_string()));

    let skip_file = File::create(&config.skip_log_path)
        .with_context(|| format!("failed to create {}", config.skip_log_path.display()))?;
    let mut skip_log = CsvSkipLog::new(skip_file);

    let options = ImportOptions {
        dry_run: config.dry_run,
        quiet: config.quiet,
        log_every: u64::try_from(config.log_every).unwrap_or(u64::MAX),
        fallback_year: Utc::now().year(),
    };
    let report = run_import(rows, &index, &sink, &mut skip_log, &options).await?;
    skip_log.into_inner()?;

    info!(
        rows_read = report.rows_read,
        processed = report.processed,
        duplicates = report.duplicates,
        skipped = report.skipped,
        balances_upserted = report.balances_upserted,
        balances_created = report.balances_created,
        deposits_inserted = report.deposits_inserted,
        deposits_existing = report.deposits_existing,
        tax_rows_upserted = report.tax_rows_upserted,
        skip_log = %config.skip_log_path.display(),
        "Import summary"
    );
    Ok(())
}
