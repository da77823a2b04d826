//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for money and charges that give
//! more meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use core_kernel::Money;
use domain_billing::TenantUtilityCharge;

/// Asserts that a Money value has exactly `expected` as its amount
pub fn assert_amount(actual: &Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Expected {} {}, got {} {}",
        actual.currency().symbol(),
        expected,
        actual.currency().symbol(),
        actual.amount()
    );
}

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts the charge amounts, in the order given
pub fn assert_charge_amounts(charges: &[TenantUtilityCharge], expected: &[Decimal]) {
    let actual: Vec<Decimal> = charges.iter().map(|c| c.charged_amount.amount()).collect();
    assert_eq!(actual, expected, "Charge amounts differ");
}

/// Asserts that charges add up to no more than the bill, give or take the
/// half cent each charge may gain from its own rounding
pub fn assert_charges_within(charges: &[TenantUtilityCharge], total: &Money) {
    let sum: Decimal = charges.iter().map(|c| c.charged_amount.amount()).sum();
    let slack = Decimal::new(5, 3) * Decimal::from(charges.len());
    assert!(
        sum <= total.amount() + slack,
        "Charges sum to {} which exceeds the bill total {} by more than {}",
        sum,
        total.amount(),
        slack
    );
}
