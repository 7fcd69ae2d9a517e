//! Tax ledger rows and admin edits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::{TaxId, UserId};

/// Whether a row records tax owed or tax already paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxKind {
    /// Tax owed.
    Due,
    /// Tax paid.
    Paid,
}

impl TaxKind {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Paid => "paid",
        }
    }

    /// Status a freshly recorded row of this kind starts in.
    #[must_use]
    pub const fn initial_status(self) -> TaxStatus {
        match self {
            Self::Due => TaxStatus::Outstanding,
            Self::Paid => TaxStatus::Settled,
        }
    }
}

impl std::str::FromStr for TaxKind {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "due" => Ok(Self::Due),
            "paid" => Ok(Self::Paid),
            other => Err(TaxError::UnknownValue(other.to_string())),
        }
    }
}

/// Settlement status of a tax row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxStatus {
    /// Not yet paid.
    Outstanding,
    /// Paid in full.
    Settled,
}

impl TaxStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Outstanding => "outstanding",
            Self::Settled => "settled",
        }
    }
}

impl std::str::FromStr for TaxStatus {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outstanding" => Ok(Self::Outstanding),
            "settled" => Ok(Self::Settled),
            other => Err(TaxError::UnknownValue(other.to_string())),
        }
    }
}

/// A row of the `taxes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRecord {
    /// Row ID.
    pub id: TaxId,
    /// Owner.
    pub user_id: UserId,
    /// Tax year.
    pub tax_year: i32,
    /// Due or paid.
    pub kind: TaxKind,
    /// Amount in USD.
    pub amount: Decimal,
    /// Settlement status.
    pub status: TaxStatus,
    /// Idempotency key for imported or paid rows.
    pub payment_reference: Option<String>,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Updated at.
    pub updated_at: DateTime<Utc>,
}

/// Admin edit of a tax row. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxUpdate {
    /// New amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// New status.
    #[serde(default)]
    pub status: Option<TaxStatus>,
}

/// Tax errors.
#[derive(Debug, Error)]
pub enum TaxError {
    /// Row does not exist or is not visible.
    #[error("tax record {0} not found")]
    NotFound(TaxId),

    /// Negative amount.
    #[error("tax amount must not be negative")]
    NegativeAmount,

    /// Update carries no fields.
    #[error("update must change amount or status")]
    EmptyUpdate,

    /// Unrecognized enum value read from storage.
    #[error("unknown tax value: {0}")]
    UnknownValue(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<TaxError> for AppError {
    fn from(err: TaxError) -> Self {
        match err {
            TaxError::NotFound(_) => Self::NotFound(err.to_string()),
            TaxError::NegativeAmount | TaxError::EmptyUpdate => Self::Validation(err.to_string()),
            TaxError::UnknownValue(_) => Self::Internal(err.to_string()),
            TaxError::Database(msg) => Self::Database(msg),
        }
    }
}

/// Validates an admin edit before anything is written.
///
/// # Errors
///
/// Returns `TaxError::EmptyUpdate` or `TaxError::NegativeAmount`.
pub fn validate_update(update: &TaxUpdate) -> Result<(), TaxError> {
    if update.amount.is_none() && update.status.is_none() {
        return Err(TaxError::EmptyUpdate);
    }
    if update.amount.is_some_and(|a| a.is_sign_negative() && !a.is_zero()) {
        return Err(TaxError::NegativeAmount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_validate_update() {
        assert!(matches!(
            validate_update(&TaxUpdate::default()),
            Err(TaxError::EmptyUpdate)
        ));
        assert!(matches!(
            validate_update(&TaxUpdate {
                amount: Some(dec!(-0.01)),
                status: None
            }),
            Err(TaxError::NegativeAmount)
        ));
        assert!(
            validate_update(&TaxUpdate {
                amount: Some(Decimal::ZERO),
                status: None
            })
            .is_ok()
        );
        assert!(
            validate_update(&TaxUpdate {
                amount: None,
                status: Some(TaxStatus::Settled)
            })
            .is_ok()
        );
    }

    #[test]
    fn test_kind_initial_status() {
        assert_eq!(TaxKind::Due.initial_status(), TaxStatus::Outstanding);
        assert_eq!(TaxKind::Paid.initial_status(), TaxStatus::Settled);
    }

    #[test]
    fn test_parse_roundtrip_and_unknown() {
        assert_eq!(TaxKind::from_str(TaxKind::Paid.as_str()).unwrap(), TaxKind::Paid);
        assert_eq!(
            TaxStatus::from_str(TaxStatus::Outstanding.as_str()).unwrap(),
            TaxStatus::Outstanding
        );
        assert!(TaxKind::from_str("refund").is_err());
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = TaxError::NegativeAmount.into();
        assert_eq!(err.status_code(), 400);
        let err: AppError = TaxError::NotFound(TaxId::new()).into();
        assert_eq!(err.status_code(), 404);
    }
}
