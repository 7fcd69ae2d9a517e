//! Outbound transfer requests and their review.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::{Currency, TransferId, UserId};

use crate::balance::MAX_BALANCE_SCALE;

/// Maximum length of a destination description.
pub const MAX_DESTINATION_LEN: usize = 255;

/// Transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Awaiting admin review.
    Pending,
    /// Funds debited.
    Completed,
    /// Declined, nothing debited.
    Rejected,
}

impl TransferStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(TransferError::UnknownValue(other.to_string())),
        }
    }
}

/// Client request for an outbound transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    /// Currency to send.
    pub currency: Currency,
    /// Amount to send.
    pub amount: Decimal,
    /// Free-form destination (IBAN, wallet address, ...).
    pub destination: String,
}

/// A row of `transfers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    /// Transfer ID.
    pub id: TransferId,
    /// Requesting user.
    pub user_id: UserId,
    /// Currency.
    pub currency: Currency,
    /// Amount.
    pub amount: Decimal,
    /// Destination.
    pub destination: String,
    /// Status.
    pub status: TransferStatus,
    /// Reviewer.
    pub reviewed_by: Option<UserId>,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Updated at.
    pub updated_at: DateTime<Utc>,
}

/// Reviewer decision on a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDecision {
    /// Debit the balance and complete.
    Complete,
    /// Decline.
    Reject,
}

/// Transfer errors.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Amount must be positive.
    #[error("transfer amount must be positive")]
    NonPositiveAmount,

    /// Too many decimal places.
    #[error("amount supports at most {MAX_BALANCE_SCALE} decimal places")]
    TooPrecise,

    /// Missing destination.
    #[error("destination is required")]
    MissingDestination,

    /// Destination too long.
    #[error("destination must be at most {MAX_DESTINATION_LEN} characters")]
    DestinationTooLong,

    /// Balance too low.
    #[error("insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Currency.
        currency: Currency,
        /// Current balance.
        available: Decimal,
        /// Requested amount.
        requested: Decimal,
    },

    /// Only pending transfers can be reviewed.
    #[error("transfer is already {0}")]
    NotPending(TransferStatus),

    /// Transfer does not exist or is not visible.
    #[error("transfer {0} not found")]
    NotFound(TransferId),

    /// Unrecognized enum value read from storage.
    #[error("unknown transfer value: {0}")]
    UnknownValue(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::NonPositiveAmount
            | TransferError::TooPrecise
            | TransferError::MissingDestination
            | TransferError::DestinationTooLong => Self::Validation(err.to_string()),
            TransferError::InsufficientFunds { .. } => Self::BusinessRule(err.to_string()),
            TransferError::NotPending(_) => Self::Conflict(err.to_string()),
            TransferError::NotFound(_) => Self::NotFound(err.to_string()),
            TransferError::UnknownValue(_) => Self::Internal(err.to_string()),
            TransferError::Database(msg) => Self::Database(msg),
        }
    }
}

/// Checks the shape of a request. Funds are checked separately.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn validate_request(req: &TransferRequest) -> Result<(), TransferError> {
    if req.amount <= Decimal::ZERO {
        return Err(TransferError::NonPositiveAmount);
    }
    if req.amount.normalize().scale() > MAX_BALANCE_SCALE {
        return Err(TransferError::TooPrecise);
    }
    let destination = req.destination.trim();
    if destination.is_empty() {
        return Err(TransferError::MissingDestination);
    }
    if destination.chars().count() > MAX_DESTINATION_LEN {
        return Err(TransferError::DestinationTooLong);
    }
    Ok(())
}

/// Checks that `available` covers `requested`.
///
/// # Errors
///
/// Returns `TransferError::InsufficientFunds` otherwise.
pub fn ensure_funds(
    currency: Currency,
    available: Decimal,
    requested: Decimal,
) -> Result<(), TransferError> {
    if requested > available {
        return Err(TransferError::InsufficientFunds {
            currency,
            available,
            requested,
        });
    }
    Ok(())
}

/// Target status for a decision on a transfer in `current` status.
///
/// # Errors
///
/// Returns `TransferError::NotPending` unless `current` is pending.
pub fn review_target(
    current: TransferStatus,
    decision: TransferDecision,
) -> Result<TransferStatus, TransferError> {
    if current != TransferStatus::Pending {
        return Err(TransferError::NotPending(current));
    }
    Ok(match decision {
        TransferDecision::Complete => TransferStatus::Completed,
        TransferDecision::Reject => TransferStatus::Rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, destination: &str) -> TransferRequest {
        TransferRequest {
            currency: Currency::Usd,
            amount,
            destination: destination.to_string(),
        }
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request(dec!(10), "DE89 3704 0044 0532 0130 00")).is_ok());
        assert!(matches!(
            validate_request(&request(dec!(0), "x")),
            Err(TransferError::NonPositiveAmount)
        ));
        assert!(matches!(
            validate_request(&request(dec!(1), "   ")),
            Err(TransferError::MissingDestination)
        ));
        assert!(matches!(
            validate_request(&request(dec!(1), &"a".repeat(256))),
            Err(TransferError::DestinationTooLong)
        ));
        assert!(matches!(
            validate_request(&request(dec!(0.000000001), "x")),
            Err(TransferError::TooPrecise)
        ));
    }

    #[test]
    fn test_ensure_funds() {
        assert!(ensure_funds(Currency::Cad, dec!(10), dec!(10)).is_ok());
        assert!(matches!(
            ensure_funds(Currency::Cad, dec!(9.99), dec!(10)),
            Err(TransferError::InsufficientFunds { .. })
        ));
    }

    #[rstest]
    #[case(TransferDecision::Complete, TransferStatus::Completed)]
    #[case(TransferDecision::Reject, TransferStatus::Rejected)]
    fn test_review_from_pending(#[case] decision: TransferDecision, #[case] expected: TransferStatus) {
        assert_eq!(review_target(TransferStatus::Pending, decision).unwrap(), expected);
    }

    #[rstest]
    #[case(TransferStatus::Completed)]
    #[case(TransferStatus::Rejected)]
    fn test_review_requires_pending(#[case] current: TransferStatus) {
        assert!(matches!(
            review_target(current, TransferDecision::Complete),
            Err(TransferError::NotPending(s)) if s == current
        ));
    }
}
