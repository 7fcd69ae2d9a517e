//! Database migration runner for Meridian.
//!
//! Usage:
//!   migrator up      - Apply the schema and row-level security policies
//!   migrator down    - Roll back the last migration
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop everything and re-apply
//!
//! Reads `DATABASE_URL`, from `.env` when present.

use sea_orm_migration::prelude::*;
use meridian_db::migration::Migrator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    cli::run_cli(Migrator).await;
}
