//! Decimal money amounts and tax rates.
//!
//! All monetary values are computed server-side with `rust_decimal` and kept
//! at two decimal places, rounding half away from zero.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Money`] or [`TaxRate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The tax rate is outside `0..=1`.
    #[error("tax rate must be between 0 and 1, got {0}")]
    InvalidTaxRate(Decimal),
}

/// A non-negative amount in the store currency, always at two decimal places.
///
/// ```
/// use checklistpro_core::Money;
/// use rust_decimal::Decimal;
///
/// let price = Money::new(Decimal::new(1000, 2)).unwrap();
/// assert_eq!((price * 2).to_string(), "20.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest price a product may carry: 99,999,999.99, the range of the
    /// `NUMERIC(10, 2)` price columns.
    pub const MAX_PRICE: Self = Self(Decimal::from_parts(0x540B_E3FF, 0x2, 0, false, 2));

    /// Create a money amount, rounding to cents.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(round_cents(amount)))
    }

    /// Create a money amount from a whole number of cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount in minor units (cents), as payment providers expect.
    #[must_use]
    pub fn to_cents(&self) -> i64 {
        let cents = (self.0 * Decimal::ONE_HUNDRED).trunc();
        i64::try_from(cents).unwrap_or(i64::MAX)
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(round_cents(self.0.saturating_add(rhs.0)))
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(round_cents(self.0.saturating_mul(Decimal::from(rhs))))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// A flat sales tax rate expressed as a fraction (`0.08` is 8%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Create a tax rate.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidTaxRate`] unless `0 <= rate <= 1`.
    pub fn new(rate: Decimal) -> Result<Self, MoneyError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(MoneyError::InvalidTaxRate(rate));
        }
        Ok(Self(rate))
    }

    /// The rate as a fraction.
    #[must_use]
    pub const fn rate(&self) -> Decimal {
        self.0
    }

    /// Tax owed on `subtotal`, rounded to cents.
    #[must_use]
    pub fn apply(&self, subtotal: Money) -> Money {
        Money(round_cents(subtotal.0 * self.0))
    }
}

impl Default for TaxRate {
    /// 8%.
    fn default() -> Self {
        Self(Decimal::new(8, 2))
    }
}

impl std::str::FromStr for TaxRate {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| MoneyError::InvalidTaxRate(Decimal::NEGATIVE_ONE))?;
        Self::new(rate)
    }
}

/// Subtotal, tax and grand total of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Compute totals from `(unit_price, quantity)` pairs.
    pub fn compute<I>(lines: I, tax_rate: TaxRate) -> Self
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        let subtotal: Money = lines.into_iter().map(|(price, qty)| price * qty).sum();
        let tax = tax_rate.apply(subtotal);
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_money_rejects_negative() {
        assert_eq!(
            Money::new(Decimal::new(-1, 2)),
            Err(MoneyError::Negative)
        );
        assert!(Money::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_money_rounds_half_away_from_zero() {
        assert_eq!(money("1.005").to_string(), "1.01");
        assert_eq!(money("1.004").to_string(), "1.00");
        assert_eq!(money("3").to_string(), "3.00");
    }

    #[test]
    fn test_money_serializes_as_string() {
        let json = serde_json::to_string(&money("19.99")).unwrap();
        assert_eq!(json, "\"19.99\"");
        assert!(serde_json::from_str::<Money>("\"-5.00\"").is_err());
    }

    #[test]
    fn test_max_price_fits_price_column() {
        assert_eq!(Money::MAX_PRICE.to_string(), "99999999.99");
        assert_eq!(Money::MAX_PRICE.to_cents(), 9_999_999_999);
        assert!(money("100000000.00") > Money::MAX_PRICE);
    }

    #[test]
    fn test_arithmetic_saturates_instead_of_panicking() {
        let huge = Money::new(Decimal::MAX).unwrap();
        assert_eq!((huge + huge).amount(), huge.amount());
        assert!(huge * 3 >= huge);
        assert_eq!((Money::MAX_PRICE * 100).to_string(), "9999999999.00");
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(money("21.60").to_cents(), 2160);
        assert_eq!(Money::from_cents(999).to_string(), "9.99");
    }

    #[test]
    fn test_totals_two_units_at_ten_dollars() {
        let totals = OrderTotals::compute([(money("10.00"), 2)], TaxRate::default());
        assert_eq!(totals.subtotal, money("20.00"));
        assert_eq!(totals.tax, money("1.60"));
        assert_eq!(totals.total, money("21.60"));
    }

    #[test]
    fn test_totals_round_tax_to_cents() {
        let totals = OrderTotals::compute(
            [(money("19.99"), 1), (money("4.99"), 3)],
            TaxRate::default(),
        );
        assert_eq!(totals.subtotal, money("34.96"));
        // 34.96 * 0.08 = 2.7968
        assert_eq!(totals.tax, money("2.80"));
        assert_eq!(totals.total, money("37.76"));
    }

    #[test]
    fn test_totals_empty() {
        let totals = OrderTotals::compute([], TaxRate::default());
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn test_tax_rate_bounds() {
        assert!("0.08".parse::<TaxRate>().is_ok());
        assert!("0".parse::<TaxRate>().is_ok());
        assert!("1.5".parse::<TaxRate>().is_err());
        assert!("-0.1".parse::<TaxRate>().is_err());
        assert!("eight".parse::<TaxRate>().is_err());
    }
}
