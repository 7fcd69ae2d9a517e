//! Matching legacy rows to directory users and planning their writes.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use meridian_shared::auth::DirectoryUser;
use meridian_shared::types::UserId;

use super::types::{DepositRecord, LegacyRow, RowPlan, SkipReason, TaxEntry};
use crate::tax::TaxKind;

/// Lookup over the hosted auth directory.
#[derive(Debug, Clone, Default)]
pub struct UserIndex {
    ids: HashSet<Uuid>,
    emails: HashMap<String, UserId>,
}

impl UserIndex {
    /// Builds the index from a directory listing.
    ///
    /// If two directory entries share an email, the first wins.
    #[must_use]
    pub fn from_directory(users: impl IntoIterator<Item = DirectoryUser>) -> Self {
        let mut index = Self::default();
        for user in users {
            index.ids.insert(user.id);
            if let Some(email) = user.email {
                let email = email.trim().to_lowercase();
                if !email.is_empty() {
                    index.emails.entry(email).or_insert(UserId::from_uuid(user.id));
                }
            }
        }
        index
    }

    /// Number of directory users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolves a row: uuid present in the directory, else case-insensitive email.
    #[must_use]
    pub fn resolve(&self, row: &LegacyRow) -> Option<UserId> {
        if let Ok(uuid) = Uuid::parse_str(row.uuid.trim()) {
            if self.ids.contains(&uuid) {
                return Some(UserId::from_uuid(uuid));
            }
        }
        let email = row.email.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }
        self.emails.get(&email).copied()
    }
}

/// Parses a legacy amount: empty is zero, `$` and thousands separators are ignored.
///
/// # Errors
///
/// Returns `SkipReason::InvalidAmount` for malformed or negative values.
pub fn parse_amount(column: &'static str, raw: &str) -> Result<Decimal, SkipReason> {
    let invalid = || SkipReason::InvalidAmount {
        column,
        value: raw.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let cleaned: String = trimmed
        .strip_prefix('$')
        .unwrap_or(trimmed)
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let amount = Decimal::from_str(cleaned.trim()).map_err(|_| invalid())?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(invalid());
    }
    Ok(amount.normalize())
}

/// Tax year from a `created_at` value, `fallback` when absent or unreadable.
#[must_use]
pub fn infer_tax_year(created_at: &str, fallback: i32) -> i32 {
    let raw = created_at.trim();
    if raw.is_empty() {
        return fallback;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.year();
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return ts.year();
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.year();
        }
    }
    fallback
}

/// Resolves a row and works out every write it needs.
///
/// # Errors
///
/// Returns the reason the row must be skipped.
pub fn plan_row(row: &LegacyRow, index: &UserIndex, fallback_year: i32) -> Result<RowPlan, SkipReason> {
    let user_id = index.resolve(row).ok_or(SkipReason::UserNotFound)?;

    let balance = parse_amount("balance", &row.balance)?;
    let deposits = parse_amount("total_deposits", &row.total_deposits)?;
    let taxes_due = parse_amount("taxes_due", &row.taxes_due)?;
    let taxes_paid = parse_amount("taxes_paid", &row.taxes_paid)?;

    let deposit = (deposits > Decimal::ZERO).then(|| DepositRecord {
        user_id,
        amount: deposits,
        reference: DepositRecord::reference_for(user_id),
    });

    let tax_year = infer_tax_year(&row.created_at, fallback_year);
    let taxes = [(TaxKind::Due, taxes_due), (TaxKind::Paid, taxes_paid)]
        .into_iter()
        .filter(|(_, amount)| *amount > Decimal::ZERO)
        .map(|(kind, amount)| TaxEntry::new(user_id, tax_year, kind, amount))
        .collect();

    Ok(RowPlan {
        user_id,
        balance,
        deposit,
        taxes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn directory_user(email: &str) -> DirectoryUser {
        DirectoryUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        }
    }

    #[rstest]
    #[case("", dec!(0))]
    #[case("  ", dec!(0))]
    #[case("12.50", dec!(12.5))]
    #[case("$1,234.56", dec!(1234.56))]
    #[case(" 0 ", dec!(0))]
    #[case("0.00000001", dec!(0.00000001))]
    fn test_parse_amount_accepts(#[case] raw: &str, #[case] expected: Decimal) {
        assert_eq!(parse_amount("balance", raw).unwrap(), expected);
    }

    #[rstest]
    #[case("abc")]
    #[case("-5")]
    #[case("1.2.3")]
    #[case("$")]
    fn test_parse_amount_rejects(#[case] raw: &str) {
        let err = parse_amount("taxes_due", raw).unwrap_err();
        assert_eq!(
            err,
            SkipReason::InvalidAmount {
                column: "taxes_due",
                value: raw.to_string()
            }
        );
    }

    #[rstest]
    #[case("2021-03-04T10:00:00Z", 2021)]
    #[case("2019-12-31T23:59:59+02:00", 2019)]
    #[case("2020-06-01 08:15:00", 2020)]
    #[case("2018-01-02", 2018)]
    #[case("07/04/2017", 2017)]
    #[case("", 2026)]
    #[case("yesterday", 2026)]
    fn test_infer_tax_year(#[case] raw: &str, #[case] expected: i32) {
        assert_eq!(infer_tax_year(raw, 2026), expected);
    }

    #[test]
    fn test_resolve_prefers_uuid_then_email() {
        let alice = directory_user("Alice@Example.com");
        let bob = directory_user("bob@example.com");
        let index = UserIndex::from_directory([alice.clone(), bob.clone()]);

        let by_uuid = LegacyRow {
            uuid: alice.id.to_string(),
            email: "bob@example.com".into(),
            ..LegacyRow::default()
        };
        assert_eq!(index.resolve(&by_uuid), Some(UserId::from_uuid(alice.id)));

        let by_email = LegacyRow {
            uuid: Uuid::new_v4().to_string(),
            email: "ALICE@example.COM".into(),
            ..LegacyRow::default()
        };
        assert_eq!(index.resolve(&by_email), Some(UserId::from_uuid(alice.id)));

        let unknown = LegacyRow {
            uuid: "not-a-uuid".into(),
            email: "carol@example.com".into(),
            ..LegacyRow::default()
        };
        assert_eq!(index.resolve(&unknown), None);
    }

    #[test]
    fn test_plan_row_builds_deterministic_references() {
        let user = directory_user("dana@example.com");
        let index = UserIndex::from_directory([user.clone()]);
        let row = LegacyRow {
            uuid: user.id.to_string(),
            email: user.email.clone().unwrap_or_default(),
            balance: "100".into(),
            total_deposits: "250.00".into(),
            taxes_due: "12".into(),
            taxes_paid: "".into(),
            created_at: "2022-05-01".into(),
        };

        let plan = plan_row(&row, &index, 2026).unwrap();
        let id = UserId::from_uuid(user.id);
        assert_eq!(plan.balance, dec!(100));
        assert_eq!(
            plan.deposit.unwrap().reference,
            format!("legacy:USD:{id}")
        );
        assert_eq!(plan.taxes.len(), 1);
        assert_eq!(
            plan.taxes[0].payment_reference,
            format!("legacy-tax:{id}:2022:due")
        );
    }

    #[test]
    fn test_plan_row_without_positive_amounts_writes_only_balance() {
        let user = directory_user("erin@example.com");
        let index = UserIndex::from_directory([user.clone()]);
        let row = LegacyRow {
            email: "erin@example.com".into(),
            balance: "0".into(),
            ..LegacyRow::default()
        };

        let plan = plan_row(&row, &index, 2026).unwrap();
        assert!(plan.deposit.is_none());
        assert!(plan.taxes.is_empty());
    }

    #[test]
    fn test_dedupe_key() {
        let with_uuid = LegacyRow {
            uuid: " ABC ".into(),
            email: "x@y.z".into(),
            ..LegacyRow::default()
        };
        assert_eq!(with_uuid.dedupe_key().as_deref(), Some("abc"));

        let email_only = LegacyRow {
            email: "Mixed@Case.io".into(),
            ..LegacyRow::default()
        };
        assert_eq!(email_only.dedupe_key().as_deref(), Some("mixed@case.io"));
        assert_eq!(LegacyRow::default().dedupe_key(), None);
    }
}
