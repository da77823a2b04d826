//! Overdue-bill and missing-reading reminders

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use core_kernel::{BillingMonth, Money, PropertyId, UtilityBillId};
use domain_allocation::{Property, UtilityType};
use domain_billing::UtilityBill;

use crate::property_name;

/// A bill the owner has not yet paid to the utility company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueBillReminder {
    pub bill_id: UtilityBillId,
    pub property_id: PropertyId,
    pub property_name: String,
    pub utility_type: UtilityType,
    pub billing_month: BillingMonth,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
}

/// An expected bill that has not been entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReadingReminder {
    pub property_id: PropertyId,
    pub property_name: String,
    pub utility_type: UtilityType,
    pub expected_month: BillingMonth,
    pub last_bill_month: Option<BillingMonth>,
    /// Days since the first of the last billed month, or of the expected
    /// month when the series has no bills at all
    pub days_since_last_bill: i64,
}

/// Overdue bills and missing readings in one report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersReport {
    pub overdue_bills: Vec<OverdueBillReminder>,
    pub missing_readings: Vec<MissingReadingReminder>,
    pub total_reminders: usize,
}

impl RemindersReport {
    pub fn new(overdue_bills: Vec<OverdueBillReminder>, missing_readings: Vec<MissingReadingReminder>) -> Self {
        let total_reminders = overdue_bills.len() + missing_readings.len();
        Self {
            overdue_bills,
            missing_readings,
            total_reminders,
        }
    }
}

/// Bills past due on `today`, not paid by the owner, at least `min_days` late
///
/// Sorted by days overdue, most overdue first.
pub fn overdue_bills(
    bills: &[UtilityBill],
    names: &HashMap<PropertyId, String>,
    today: NaiveDate,
    min_days: i64,
) -> Vec<OverdueBillReminder> {
    let mut reminders: Vec<OverdueBillReminder> = bills
        .iter()
        .filter(|b| b.is_overdue_on(today))
        .filter(|b| b.days_overdue(today) >= min_days)
        .map(|b| OverdueBillReminder {
            bill_id: b.id,
            property_id: b.property_id,
            property_name: property_name(names, b.property_id),
            utility_type: b.utility_type,
            billing_month: b.billing_month,
            amount: b.total_amount,
            due_date: b.due_date,
            days_overdue: b.days_overdue(today),
        })
        .collect();
    reminders.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then(a.property_name.cmp(&b.property_name))
            .then(a.utility_type.cmp(&b.utility_type))
    });
    reminders
}

/// Months a property should have a bill for but does not
///
/// `utility_types` are the types some active lease on the property carries
/// a nonzero share of; `bills` are the property's bills. The current month
/// and the `lookback_months - 1` before it are checked, and a month only
/// counts once `grace_days` have passed since its first day.
pub fn missing_readings(
    property: &Property,
    utility_types: &BTreeSet<UtilityType>,
    bills: &[UtilityBill],
    today: NaiveDate,
    lookback_months: u32,
    grace_days: i64,
) -> Vec<MissingReadingReminder> {
    let current = BillingMonth::of(today);
    let mut reminders = Vec::new();

    for offset in 0..lookback_months {
        let expected = current.minus_months(offset);
        let days_since_expected = expected.days_since_start(today);
        if days_since_expected < grace_days {
            continue;
        }
        for utility_type in utility_types {
            let months = bills
                .iter()
                .filter(|b| b.property_id == property.id && b.utility_type == *utility_type)
                .map(|b| b.billing_month);
            if months.clone().any(|m| m == expected) {
                continue;
            }
            let last_bill_month = months.max();
            reminders.push(MissingReadingReminder {
                property_id: property.id,
                property_name: property.name.clone(),
                utility_type: *utility_type,
                expected_month: expected,
                last_bill_month,
                days_since_last_bill: last_bill_month
                    .map_or(days_since_expected, |m| m.days_since_start(today)),
            });
        }
    }
    reminders
}

/// Orders missing readings across properties, longest gap first
pub(crate) fn sort_missing(reminders: &mut [MissingReadingReminder]) {
    reminders.sort_by(|a, b| {
        b.days_since_last_bill
            .cmp(&a.days_since_last_bill)
            .then(a.property_name.cmp(&b.property_name))
            .then(a.utility_type.cmp(&b.utility_type))
            .then(b.expected_month.cmp(&a.expected_month))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{Currency, UserId};
    use domain_billing::NewBill;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bill(property_id: PropertyId, utility_type: UtilityType, month: &str, due: NaiveDate) -> UtilityBill {
        let billing_month: BillingMonth = month.parse().unwrap();
        let request = NewBill {
            property_id,
            utility_type,
            provider: "Metro".to_string(),
            billing_month,
            total_amount: Money::new(dec!(75), Currency::USD),
            due_date: due,
            bill_date: billing_month.first_day(),
            notes: None,
            document_id: None,
        };
        UtilityBill::from_request(UserId::new(), request, Utc::now())
    }

    mod overdue_tests {
        use super::*;

        #[test]
        fn test_days_overdue_counted_in_whole_days() {
            let p = PropertyId::new();
            let bills = vec![bill(p, UtilityType::Electric, "2024-01", date(2024, 1, 10))];
            let found = overdue_bills(&bills, &HashMap::new(), date(2024, 2, 1), 1);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].days_overdue, 22);

            assert_eq!(overdue_bills(&bills, &HashMap::new(), date(2024, 2, 1), 22).len(), 1);
            assert!(overdue_bills(&bills, &HashMap::new(), date(2024, 2, 1), 23).is_empty());
        }

        #[test]
        fn test_due_today_and_owner_paid_are_not_overdue() {
            let p = PropertyId::new();
            let mut paid = bill(p, UtilityType::Gas, "2024-01", date(2024, 1, 10));
            paid.owner_paid = true;
            let due_today = bill(p, UtilityType::Water, "2024-01", date(2024, 2, 1));
            let found = overdue_bills(&[paid, due_today], &HashMap::new(), date(2024, 2, 1), 0);
            assert!(found.is_empty());
        }

        #[test]
        fn test_most_overdue_first() {
            let p = PropertyId::new();
            let bills = vec![
                bill(p, UtilityType::Gas, "2024-01", date(2024, 1, 25)),
                bill(p, UtilityType::Water, "2023-12", date(2023, 12, 20)),
            ];
            let found = overdue_bills(&bills, &HashMap::new(), date(2024, 2, 1), 1);
            assert_eq!(found[0].utility_type, UtilityType::Water);
            assert_eq!(found[1].days_overdue, 7);
        }
    }

    mod missing_tests {
        use super::*;

        fn setup() -> (Property, BTreeSet<UtilityType>) {
            let property = Property::new(UserId::new(), "Oak Street");
            let types = BTreeSet::from([UtilityType::Electric, UtilityType::Water]);
            (property, types)
        }

        #[test]
        fn test_previous_month_flagged_after_grace() {
            let (property, types) = setup();
            let bills = vec![
                bill(property.id, UtilityType::Electric, "2024-01", date(2024, 1, 25)),
                bill(property.id, UtilityType::Water, "2023-12", date(2023, 12, 25)),
                bill(property.id, UtilityType::Water, "2024-01", date(2024, 1, 25)),
            ];
            // 2024-02 started 35 days before 2024-03-07
            let found = missing_readings(&property, &types, &bills, date(2024, 3, 7), 2, 35);
            assert_eq!(found.len(), 2);
            assert!(found.iter().all(|r| r.expected_month.to_string() == "2024-02"));
            let electric = found.iter().find(|r| r.utility_type == UtilityType::Electric).unwrap();
            assert_eq!(electric.last_bill_month.map(|m| m.to_string()).as_deref(), Some("2024-01"));
            assert_eq!(electric.days_since_last_bill, 66);
        }

        #[test]
        fn test_within_grace_not_flagged() {
            let (property, types) = setup();
            let found = missing_readings(&property, &types, &[], date(2024, 3, 5), 2, 35);
            // 2024-02 started 33 days ago, 2024-03 four days ago
            assert!(found.is_empty());
        }

        #[test]
        fn test_lookback_rolls_over_year() {
            let (property, types) = setup();
            let found = missing_readings(&property, &types, &[], date(2024, 1, 20), 3, 35);
            let months: BTreeSet<String> = found.iter().map(|r| r.expected_month.to_string()).collect();
            assert_eq!(months, BTreeSet::from(["2023-11".to_string(), "2023-12".to_string()]));
            let oldest = found.iter().find(|r| r.expected_month.to_string() == "2023-11").unwrap();
            assert_eq!(oldest.last_bill_month, None);
            assert_eq!(oldest.days_since_last_bill, 80);
        }

        #[test]
        fn test_billed_month_not_flagged() {
            let (property, _) = setup();
            let types = BTreeSet::from([UtilityType::Gas]);
            let bills = vec![bill(property.id, UtilityType::Gas, "2024-02", date(2024, 2, 25))];
            assert!(missing_readings(&property, &types, &bills, date(2024, 3, 20), 2, 35).is_empty());
        }

        #[test]
        fn test_sort_missing_longest_gap_first() {
            let (property, types) = setup();
            let bills = vec![bill(property.id, UtilityType::Water, "2023-06", date(2023, 6, 25))];
            let mut found = missing_readings(&property, &types, &bills, date(2024, 3, 7), 2, 35);
            sort_missing(&mut found);
            assert_eq!(found[0].utility_type, UtilityType::Water);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_flags_a_month_inside_grace(day_index in 0i64..3650, lookback in 1u32..12) {
                let (property, types) = {
                    let property = Property::new(UserId::new(), "Any");
                    (property, BTreeSet::from([UtilityType::Trash]))
                };
                let today = date(2015, 1, 1) + chrono::Days::new(day_index as u64);
                let found = missing_readings(&property, &types, &[], today, lookback, 35);
                for reminder in found {
                    prop_assert!(reminder.expected_month.days_since_start(today) >= 35);
                }
            }
        }
    }
}
