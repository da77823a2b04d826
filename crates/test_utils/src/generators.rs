//! Property-Based Test Generators
//!
//! Provides proptest strategies for bill amounts, allocation splits and
//! billing months.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{BillingMonth, Currency, Money};

/// Positive amounts in cents, up to one million dollars
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::USD))
}

/// Percentages with two decimals, 0.01 to 100.00
pub fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=10_000u32).prop_map(|n| Decimal::new(i64::from(n), 2))
}

/// `count` shares with two decimals whose total is at most 100
pub fn split_strategy(count: usize) -> impl Strategy<Value = Vec<Decimal>> {
    proptest::collection::vec(1u32..1000u32, count..=count).prop_map(|weights| {
        let total: u32 = weights.iter().sum();
        weights
            .into_iter()
            .map(|w| (Decimal::from(w) * Decimal::ONE_HUNDRED / Decimal::from(total)).trunc_with_scale(2))
            .collect()
    })
}

pub fn billing_month_strategy() -> impl Strategy<Value = BillingMonth> {
    (2020i32..2030i32, 1u32..=12u32).prop_map(|(y, m)| BillingMonth::new(y, m).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_splits_never_exceed_100(shares in split_strategy(4)) {
            let total: Decimal = shares.iter().sum();
            prop_assert!(total <= Decimal::ONE_HUNDRED);
        }
    }
}
