//! Spike detection against a trailing three-month average
//!
//! Bills are grouped per property and utility type and walked oldest first.
//! A bill is compared with the mean of the three bills before it, so the
//! first three bills of any series are never evaluated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use core_kernel::{BillingMonth, Money, PropertyId, UtilityBillId};
use domain_allocation::UtilityType;
use domain_billing::UtilityBill;

use crate::{one_decimal, property_name};

/// Bills needed before the one being evaluated
const BASELINE_MONTHS: usize = 3;

/// How far a bill sits above its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// High from +100%, medium from +50%, low below that
    pub fn classify(percentage_increase: Decimal) -> Self {
        if percentage_increase >= Decimal::ONE_HUNDRED {
            Severity::High
        } else if percentage_increase >= Decimal::from(50) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bill flagged as unusually high
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityAnomaly {
    pub bill_id: UtilityBillId,
    pub property_id: PropertyId,
    pub property_name: String,
    pub utility_type: UtilityType,
    pub billing_month: BillingMonth,
    pub amount: Money,
    pub previous_average: Money,
    /// Rounded to one decimal place
    pub percentage_increase: Decimal,
    pub severity: Severity,
}

/// Flags bills whose amount is at least `threshold` percent above the mean
/// of the three preceding bills in the same property and utility type
///
/// Sorted by severity, highest first, then by increase, largest first.
pub fn detect_anomalies(
    bills: &[UtilityBill],
    names: &HashMap<PropertyId, String>,
    threshold: Decimal,
) -> Vec<UtilityAnomaly> {
    let mut series: BTreeMap<(PropertyId, UtilityType), Vec<&UtilityBill>> = BTreeMap::new();
    for bill in bills {
        series.entry((bill.property_id, bill.utility_type)).or_default().push(bill);
    }

    let mut anomalies = Vec::new();
    for ((property_id, _), mut history) in series {
        if history.len() <= BASELINE_MONTHS {
            continue;
        }
        history.sort_by_key(|b| b.billing_month);
        let name = property_name(names, property_id);

        for window in history.windows(BASELINE_MONTHS + 1) {
            let (baseline, current) = window.split_at(BASELINE_MONTHS);
            let current = current[0];
            let average = baseline.iter().map(|b| b.total_amount.amount()).sum::<Decimal>()
                / Decimal::from(BASELINE_MONTHS as u32);
            if average.is_zero() {
                continue;
            }
            let increase = (current.total_amount.amount() - average) / average * Decimal::ONE_HUNDRED;
            if increase < threshold {
                continue;
            }
            anomalies.push(UtilityAnomaly {
                bill_id: current.id,
                property_id,
                property_name: name.clone(),
                utility_type: current.utility_type,
                billing_month: current.billing_month,
                amount: current.total_amount,
                previous_average: Money::new(average, current.total_amount.currency()).round_to_currency(),
                percentage_increase: one_decimal(increase),
                severity: Severity::classify(increase),
            });
        }
    }

    anomalies.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.percentage_increase.cmp(&a.percentage_increase))
    });
    anomalies
}
