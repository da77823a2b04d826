//! Month-over-month change per property and utility type

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use core_kernel::{BillingMonth, Currency, Money, PropertyId};
use domain_allocation::UtilityType;
use domain_billing::UtilityBill;

use crate::{one_decimal, property_name};

/// Change between two adjacent billing months of one series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyDelta {
    pub property_id: PropertyId,
    pub property_name: String,
    pub utility_type: UtilityType,
    pub billing_month: BillingMonth,
    pub previous_month: BillingMonth,
    pub current_amount: Money,
    pub previous_amount: Money,
    pub delta: Money,
    /// Rounded to one decimal place
    pub percentage_change: Decimal,
}

/// Computes deltas over the most recent `months` billing months seen in `bills`
///
/// The window is taken over every month that has any bill, so all series are
/// compared on the same months. A pair is skipped when either month has no
/// bill for the series. Sorted by month, newest first.
pub fn monthly_deltas(
    bills: &[UtilityBill],
    names: &HashMap<PropertyId, String>,
    months: u32,
) -> Vec<MonthlyDelta> {
    let mut series: BTreeMap<(PropertyId, UtilityType), BTreeMap<BillingMonth, (Decimal, Currency)>> =
        BTreeMap::new();
    for bill in bills {
        let slot = series
            .entry((bill.property_id, bill.utility_type))
            .or_default()
            .entry(bill.billing_month)
            .or_insert((Decimal::ZERO, bill.total_amount.currency()));
        slot.0 += bill.total_amount.amount();
    }

    let all_months: BTreeSet<BillingMonth> = bills.iter().map(|b| b.billing_month).collect();
    let skip = all_months.len().saturating_sub(months as usize);
    let window: Vec<BillingMonth> = all_months.into_iter().skip(skip).collect();

    let mut deltas = Vec::new();
    for ((property_id, utility_type), totals) in &series {
        for pair in window.windows(2) {
            let (previous_month, month) = (pair[0], pair[1]);
            let (Some(&(previous, currency)), Some(&(current, _))) = (totals.get(&previous_month), totals.get(&month))
            else {
                continue;
            };
            if previous.is_zero() {
                continue;
            }
            let change = current - previous;
            deltas.push(MonthlyDelta {
                property_id: *property_id,
                property_name: property_name(names, *property_id),
                utility_type: *utility_type,
                billing_month: month,
                previous_month,
                current_amount: Money::new(current, currency),
                previous_amount: Money::new(previous, currency),
                delta: Money::new(change, currency),
                percentage_change: one_decimal(change / previous * Decimal::ONE_HUNDRED),
            });
        }
    }

    deltas.sort_by(|a, b| {
        b.billing_month
            .cmp(&a.billing_month)
            .then_with(|| a.property_name.cmp(&b.property_name))
            .then(a.utility_type.cmp(&b.utility_type))
    });
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::UserId;
    use domain_billing::NewBill;
    use rust_decimal_macros::dec;

    fn bill(property_id: PropertyId, utility_type: UtilityType, month: &str, amount: Decimal) -> UtilityBill {
        let billing_month: BillingMonth = month.parse().unwrap();
        let request = NewBill {
            property_id,
            utility_type,
            provider: "Metro".to_string(),
            billing_month,
            total_amount: Money::new(amount, Currency::USD),
            due_date: billing_month.day_offset(20).unwrap(),
            bill_date: billing_month.first_day(),
            notes: None,
            document_id: None,
        };
        UtilityBill::from_request(UserId::new(), request, Utc::now())
    }

    #[test]
    fn test_adjacent_month_changes() {
        let p = PropertyId::new();
        let bills = vec![
            bill(p, UtilityType::Electric, "2024-01", dec!(100)),
            bill(p, UtilityType::Electric, "2024-02", dec!(150)),
            bill(p, UtilityType::Electric, "2024-03", dec!(120)),
        ];
        let deltas = monthly_deltas(&bills, &HashMap::new(), 6);
        assert_eq!(deltas.len(), 2);

        assert_eq!(deltas[0].billing_month.to_string(), "2024-03");
        assert_eq!(deltas[0].delta.amount(), dec!(-30));
        assert_eq!(deltas[0].percentage_change, dec!(-20));

        assert_eq!(deltas[1].billing_month.to_string(), "2024-02");
        assert_eq!(deltas[1].percentage_change, dec!(50));
    }

    #[test]
    fn test_gaps_are_skipped() {
        let p = PropertyId::new();
        let bills = vec![
            bill(p, UtilityType::Water, "2024-01", dec!(80)),
            bill(p, UtilityType::Water, "2024-03", dec!(90)),
            // another series fills in February, so February is in the window
            bill(p, UtilityType::Gas, "2024-02", dec!(40)),
        ];
        assert!(monthly_deltas(&bills, &HashMap::new(), 6).is_empty());
    }

    #[test]
    fn test_window_keeps_most_recent_months() {
        let p = PropertyId::new();
        let bills: Vec<UtilityBill> = ["2023-10", "2023-11", "2023-12", "2024-01"]
            .iter()
            .map(|m| bill(p, UtilityType::Trash, m, dec!(25)))
            .collect();
        let deltas = monthly_deltas(&bills, &HashMap::new(), 2);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].previous_month.to_string(), "2023-12");
        assert_eq!(deltas[0].billing_month.to_string(), "2024-01");
        assert!(deltas[0].delta.is_zero());
    }
}
