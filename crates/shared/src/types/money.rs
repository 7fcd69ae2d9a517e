//! Money type with decimal precision and currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! This type wraps `rust_decimal::Decimal` for arbitrary precision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Represents a monetary amount with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount in major units (e.g. dollars, not cents).
    pub amount: Decimal,
    /// Currency the amount is held in.
    pub currency: Currency,
}

/// Currencies a client can hold a balance in.
///
/// Each currency is backed by its own balance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// US Dollar.
    Usd,
    /// Euro.
    Euro,
    /// Canadian Dollar.
    Cad,
    /// The platform's crypto asset.
    NewCrypto,
}

impl Currency {
    /// All supported currencies, in display order.
    pub const ALL: [Self; 4] = [Self::Usd, Self::Euro, Self::Cad, Self::NewCrypto];

    /// Short code used in references and API paths.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Euro => "EUR",
            Self::Cad => "CAD",
            Self::NewCrypto => "NEWCRYPTO",
        }
    }

    /// Maximum number of decimal places stored for this currency.
    #[must_use]
    pub const fn scale(self) -> u32 {
        match self {
            Self::Usd | Self::Euro | Self::Cad => 2,
            Self::NewCrypto => 8,
        }
    }
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" | "euro" => Ok(Self::Euro),
            "cad" => Ok(Self::Cad),
            "newcrypto" => Ok(Self::NewCrypto),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_money_zero() {
        let money = Money::zero(Currency::Cad);
        assert!(money.is_zero());
        assert!(!money.is_negative());
        assert_eq!(money.currency, Currency::Cad);
    }

    #[test]
    fn test_money_is_negative() {
        assert!(Money::new(dec!(-0.01), Currency::Usd).is_negative());
        assert!(!Money::new(dec!(10), Currency::Usd).is_negative());
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::Usd.to_string(), "USD");
        assert_eq!(Currency::Euro.to_string(), "EUR");
        assert_eq!(Currency::NewCrypto.code(), "NEWCRYPTO");
        assert_eq!(Currency::NewCrypto.scale(), 8);
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::Usd);
        assert_eq!(Currency::from_str("EUR").unwrap(), Currency::Euro);
        assert_eq!(Currency::from_str("euro").unwrap(), Currency::Euro);
        assert_eq!(Currency::from_str("NewCrypto").unwrap(), Currency::NewCrypto);
        assert!(Currency::from_str("JPY").is_err());
    }

    #[test]
    fn test_currency_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Currency::NewCrypto).unwrap(),
            "\"newcrypto\""
        );
    }
}
