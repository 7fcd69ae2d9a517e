//! Per-currency balances and admin adjustments.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meridian_shared::AppError;
use meridian_shared::types::{Currency, UserId};
use uuid::Uuid;

/// Largest number of decimal places accepted on any balance.
pub const MAX_BALANCE_SCALE: u32 = 8;

/// A user's balance in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Currency.
    pub currency: Currency,
    /// Amount.
    pub amount: Decimal,
    /// Last change, absent when the row does not exist yet.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Dashboard view of all four balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSheet {
    /// Owner.
    pub user_id: UserId,
    /// One entry per supported currency, in `Currency::ALL` order.
    pub balances: Vec<Balance>,
}

impl BalanceSheet {
    /// Builds a sheet from stored rows; currencies without a row read as zero.
    #[must_use]
    pub fn from_rows(user_id: UserId, rows: &[Balance]) -> Self {
        let balances = Currency::ALL
            .into_iter()
            .map(|currency| {
                rows.iter()
                    .find(|b| b.currency == currency)
                    .cloned()
                    .unwrap_or(Balance {
                        currency,
                        amount: Decimal::ZERO,
                        updated_at: None,
                    })
            })
            .collect();
        Self { user_id, balances }
    }

    /// Amount held in `currency`.
    #[must_use]
    pub fn amount(&self, currency: Currency) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.currency == currency)
            .map_or(Decimal::ZERO, |b| b.amount)
    }
}

/// Admin request to set a balance.
#[derive(Debug, Clone, Deserialize)]
pub struct SetBalanceRequest {
    /// New absolute amount.
    pub amount: Decimal,
    /// Optional note recorded on the history row.
    #[serde(default)]
    pub note: Option<String>,
}

/// History row written for every admin balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    /// Owner.
    pub user_id: UserId,
    /// Currency.
    pub currency: Currency,
    /// Balance before the change.
    pub previous: Decimal,
    /// Balance after the change.
    pub new_amount: Decimal,
    /// `new_amount - previous`.
    pub delta: Decimal,
    /// Description for `TransactionHistory`.
    pub description: String,
}

/// Kind of a `TransactionHistory` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Money credited from outside.
    Deposit,
    /// Completed outbound transfer.
    Withdrawal,
    /// Admin balance change.
    Adjustment,
    /// Tax settled from the balance.
    TaxPayment,
}

impl HistoryKind {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Adjustment => "adjustment",
            Self::TaxPayment => "tax_payment",
        }
    }
}

impl std::str::FromStr for HistoryKind {
    type Err = BalanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "adjustment" => Ok(Self::Adjustment),
            "tax_payment" => Ok(Self::TaxPayment),
            other => Err(BalanceError::UnknownValue(other.to_string())),
        }
    }
}

/// A row of `TransactionHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Row ID.
    pub id: Uuid,
    /// Owner.
    pub user_id: UserId,
    /// Kind.
    pub kind: HistoryKind,
    /// Currency.
    pub currency: Currency,
    /// Signed amount; adjustments carry the delta.
    pub amount: Decimal,
    /// Free-form description.
    pub description: Option<String>,
    /// Idempotency key.
    pub reference: Option<String>,
    /// Status.
    pub status: String,
    /// Created at.
    pub created_at: DateTime<Utc>,
}

/// Balance errors.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Negative amount.
    #[error("balance must not be negative")]
    Negative,

    /// Too many decimal places.
    #[error("balance supports at most {MAX_BALANCE_SCALE} decimal places")]
    TooPrecise,

    /// Unrecognized value read from storage.
    #[error("unknown balance value: {0}")]
    UnknownValue(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<BalanceError> for AppError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::Negative | BalanceError::TooPrecise => Self::Validation(err.to_string()),
            BalanceError::UnknownValue(_) => Self::Internal(err.to_string()),
            BalanceError::Database(msg) => Self::Database(msg),
        }
    }
}

/// Validates an amount an admin wants to set.
///
/// # Errors
///
/// Returns `BalanceError::Negative` or `BalanceError::TooPrecise`.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, BalanceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BalanceError::Negative);
    }
    let normalized = amount.normalize();
    if normalized.scale() > MAX_BALANCE_SCALE {
        return Err(BalanceError::TooPrecise);
    }
    Ok(normalized)
}

/// Plans the adjustment for setting `currency` from `previous` to `requested`.
///
/// # Errors
///
/// Returns an error if `requested` is not a valid balance.
pub fn plan_adjustment(
    user_id: UserId,
    currency: Currency,
    previous: Decimal,
    request: &SetBalanceRequest,
) -> Result<Adjustment, BalanceError> {
    let new_amount = validate_amount(request.amount)?;
    let delta = new_amount - previous;
    let description = request
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map_or_else(
            || format!("Admin adjustment: {previous} -> {new_amount} {}", currency.code()),
            str::to_string,
        );

    Ok(Adjustment {
        user_id,
        currency,
        previous,
        new_amount,
        delta,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0))]
    #[case(dec!(100.50))]
    #[case(dec!(0.00000001))]
    #[case(dec!(12.3400000000))]
    fn test_valid_amounts(#[case] amount: Decimal) {
        assert!(validate_amount(amount).is_ok());
    }

    #[test]
    fn test_invalid_amounts() {
        assert!(matches!(validate_amount(dec!(-1)), Err(BalanceError::Negative)));
        assert!(matches!(
            validate_amount(dec!(0.000000001)),
            Err(BalanceError::TooPrecise)
        ));
    }

    #[test]
    fn test_history_kind_parse() {
        use std::str::FromStr;
        assert_eq!(HistoryKind::from_str("tax_payment").unwrap(), HistoryKind::TaxPayment);
        assert_eq!(HistoryKind::Withdrawal.as_str(), "withdrawal");
        assert!(matches!(
            HistoryKind::from_str("refund"),
            Err(BalanceError::UnknownValue(_))
        ));
    }

    #[test]
    fn test_sheet_fills_missing_currencies() {
        let user_id = UserId::new();
        let rows = [Balance {
            currency: Currency::Cad,
            amount: dec!(7),
            updated_at: Some(Utc::now()),
        }];
        let sheet = BalanceSheet::from_rows(user_id, &rows);
        assert_eq!(sheet.balances.len(), 4);
        assert_eq!(sheet.balances[0].currency, Currency::Usd);
        assert_eq!(sheet.amount(Currency::Usd), Decimal::ZERO);
        assert_eq!(sheet.amount(Currency::Cad), dec!(7));
    }

    #[test]
    fn test_plan_adjustment_delta_and_description() {
        let user_id = UserId::new();
        let adj = plan_adjustment(
            user_id,
            Currency::Euro,
            dec!(50),
            &SetBalanceRequest {
                amount: dec!(30),
                note: None,
            },
        )
        .unwrap();
        assert_eq!(adj.delta, dec!(-20));
        assert_eq!(adj.new_amount, dec!(30));
        assert!(adj.description.contains("EUR"));

        let noted = plan_adjustment(
            user_id,
            Currency::Usd,
            dec!(0),
            &SetBalanceRequest {
                amount: dec!(5),
                note: Some(" wire received ".into()),
            },
        )
        .unwrap();
        assert_eq!(noted.description, "wire received");
    }
}
