//! Money types with precise decimal arithmetic
//!
//! Utility invoices, tenant charges and payments are all expressed as `Money`.
//! Amounts are held with four decimal places internally and rounded to the
//! currency's minor unit with round-half-up whenever a value is settled
//! (a charge is computed, a balance is reported).

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Whether `amount` is a whole number of minor units, so 10.50 for USD
    /// but not 10.505
    pub fn fits_minor_units(&self, amount: Decimal) -> bool {
        amount.normalize().scale() <= self.decimal_places()
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CAD" => Ok(Currency::CAD),
            "AUD" => Ok(Currency::AUD),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Percentage {0} is outside 0-100")]
    PercentageOutOfRange(Decimal),
}

/// A monetary amount with associated currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(4),
            currency,
        }
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        let divisor = Decimal::new(10_i64.pow(currency.decimal_places()), 0);
        Self::new(Decimal::new(minor_units, 0) / divisor, currency)
    }

    /// Whether the amount can be paid exactly in this currency
    pub fn is_in_minor_units(&self) -> bool {
        self.currency.fits_minor_units(self.amount)
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// Rounds to the currency's minor unit, half away from zero
    ///
    /// `12.345` becomes `12.35` and `-12.345` becomes `-12.35`.
    pub fn round_to_currency(&self) -> Self {
        Self {
            amount: self.amount.round_dp_with_strategy(
                self.currency.decimal_places(),
                RoundingStrategy::MidpointAwayFromZero,
            ),
            currency: self.currency,
        }
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Multiplies by a scalar
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor, self.currency)
    }

    /// Applies a percentage share, rounding the exact product once to the
    /// minor unit, half away from zero
    pub fn share(&self, percentage: Percentage) -> Self {
        let exact = self.amount * percentage.as_fraction();
        Self {
            amount: exact.round_dp_with_strategy(
                self.currency.decimal_places(),
                RoundingStrategy::MidpointAwayFromZero,
            ),
            currency: self.currency,
        }
    }

    /// Clamps a negative amount up to zero
    pub fn max_zero(self) -> Money {
        if self.is_negative() {
            Money::zero(self.currency)
        } else {
            self
        }
    }

    /// Returns the smaller of two amounts in the same currency
    pub fn min(self, other: Money) -> Money {
        if other.amount < self.amount {
            other
        } else {
            self
        }
    }

    /// Sums an iterator of amounts, starting from zero in `currency`
    pub fn sum<'a, I>(currency: Currency, items: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{}{:.dp$}",
            self.currency.symbol(),
            self.amount,
            dp = dp as usize
        )
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other)
            .expect("Currency mismatch in Money::add")
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other)
            .expect("Currency mismatch in Money::sub")
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

/// Amounts in different currencies are unordered
impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        (self.currency == other.currency).then(|| self.amount.cmp(&other.amount))
    }
}

/// A responsibility share expressed in percent, always within `0..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);
    pub const FULL: Percentage = Percentage(Decimal::ONE_HUNDRED);

    /// Creates a percentage, rejecting values outside `0..=100`
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(MoneyError::PercentageOutOfRange(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Returns the raw percent value (e.g. 60 for 60%)
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns the share as a fraction (e.g. 0.6 for 60%)
    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Remainder up to 100%, or zero when `total` is already at or past 100
    pub fn remainder_of(total: Decimal) -> Decimal {
        (Decimal::ONE_HUNDRED - total).max(Decimal::ZERO)
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Decimal {
        p.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_round_half_up_on_cent_boundary() {
        let m = Money::new(dec!(12.345), Currency::USD);
        assert_eq!(m.round_to_currency().amount(), dec!(12.35));

        let m = Money::new(dec!(12.344), Currency::USD);
        assert_eq!(m.round_to_currency().amount(), dec!(12.34));

        let m = Money::new(dec!(-12.345), Currency::USD);
        assert_eq!(m.round_to_currency().amount(), dec!(-12.35));
    }

    #[test]
    fn test_share_of_bill() {
        let total = Money::new(dec!(300.00), Currency::USD);
        let pct = Percentage::new(dec!(60)).unwrap();
        assert_eq!(total.share(pct).amount(), dec!(180.00));

        let odd = Money::new(dec!(100.00), Currency::USD);
        let third = Percentage::new(dec!(33.335)).unwrap();
        assert_eq!(odd.share(third).amount(), dec!(33.34));
    }

    #[test]
    fn test_sub_cent_amounts_are_not_minor_units() {
        assert!(Money::new(dec!(10.50), Currency::USD).is_in_minor_units());
        assert!(Money::new(dec!(10.5000), Currency::USD).is_in_minor_units());
        assert!(!Money::new(dec!(10.004), Currency::USD).is_in_minor_units());
        assert!(!Currency::JPY.fits_minor_units(dec!(100.5)));
        assert!(Currency::JPY.fits_minor_units(dec!(100)));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(dec!(100.00), Currency::USD);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        let result = usd.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(matches!(
            Percentage::new(dec!(100.01)),
            Err(MoneyError::PercentageOutOfRange(_))
        ));
        assert!(Percentage::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_percentage_serde_rejects_out_of_range() {
        let parsed: Result<Percentage, _> = serde_json::from_str("\"120\"");
        assert!(parsed.is_err());
        let parsed: Percentage = serde_json::from_str("\"45.5\"").unwrap();
        assert_eq!(parsed.value(), dec!(45.5));
    }

    #[test]
    fn test_display_uses_symbol() {
        let m = Money::new(dec!(80), Currency::USD);
        assert_eq!(m.to_string(), "$80.00");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn share_rounds_the_exact_product_once() {
        // 1.00 x 0.495% = 0.00495, which is below the half-cent
        let tiny = Money::new(dec!(1.00), Currency::USD).share(Percentage::new(dec!(0.495)).unwrap());
        assert_eq!(tiny.amount(), dec!(0.00));

        // 1.00 x 0.5% = 0.005 sits on the half-cent and rounds up
        let half = Money::new(dec!(1.00), Currency::USD).share(Percentage::new(dec!(0.5)).unwrap());
        assert_eq!(half.amount(), dec!(0.01));

        // 33.33 x 33.335% = 11.1105555 rounds down at the cent
        let third = Money::new(dec!(33.33), Currency::USD).share(Percentage::new(dec!(33.335)).unwrap());
        assert_eq!(third.amount(), dec!(11.11));
    }

    proptest! {
        #[test]
        fn share_is_within_half_cent_of_exact(
            cents in 1i64..100_000_000i64,
            basis_points in 0u32..=10_000u32
        ) {
            let total = Money::from_minor(cents, Currency::USD);
            let pct = Percentage::new(Decimal::new(basis_points as i64, 2)).unwrap();
            let exact = total.amount() * pct.as_fraction();
            let diff = (total.share(pct).amount() - exact).abs();
            prop_assert!(diff <= dec!(0.005));
        }

        #[test]
        fn money_arithmetic_is_associative(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
            c in -1_000_000i64..1_000_000i64
        ) {
            let ma = Money::from_minor(a, Currency::USD);
            let mb = Money::from_minor(b, Currency::USD);
            let mc = Money::from_minor(c, Currency::USD);

            prop_assert_eq!((ma + mb) + mc, ma + (mb + mc));
        }
    }
}
