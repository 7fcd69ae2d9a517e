//! Core business logic for Meridian.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Persistence is reached through the port traits defined here and implemented
//! by the db crate.
//!
//! # Modules
//!
//! - `access` - Admin identity loading and hierarchical accessible-set resolution
//! - `import` - Legacy spreadsheet reconciliation and idempotent ledger writes
//! - `kyc` - Identity document submission and review
//! - `balance` - Per-currency balances and admin adjustments
//! - `transfer` - Outbound transfer requests and review
//! - `messaging` - Admin-to-user messages and presence
//! - `chat` - Live support chat
//! - `tax` - Tax ledger rows
//! - `storage` - Object storage for documents

pub mod access;
pub mod balance;
pub mod chat;
pub mod import;
pub mod kyc;
pub mod messaging;
pub mod storage;
pub mod tax;
pub mod transfer;
