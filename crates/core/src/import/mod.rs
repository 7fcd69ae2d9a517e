//! Legacy spreadsheet import.
//!
//! Reconciles legacy per-user financial rows against the hosted auth
//! directory and upserts balances, deposits and tax rows. Every write is
//! keyed so a run can be repeated without duplicating anything.
//!
//! # Modules
//!
//! - `types` - Input rows, skip entries, planned writes and the run report
//! - `reconcile` - User matching, amount parsing and tax-year inference
//! - `runner` - The import loop and its `AuthDirectory` / `LedgerSink` ports
//! - `error` - Import error types

pub mod error;
pub mod reconcile;
pub mod runner;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::ImportError;
pub use reconcile::{UserIndex, infer_tax_year, parse_amount, plan_row};
pub use runner::{AuthDirectory, LedgerSink, SkipLog, run_import};
pub use types::{
    DepositRecord, ImportOptions, ImportReport, LegacyRow, RowPlan, SkipEntry, SkipReason,
    TaxEntry,
};
