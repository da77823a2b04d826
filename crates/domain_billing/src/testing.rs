//! Shared fixtures for this crate's unit tests

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use core_kernel::{BillingMonth, Currency, FixedClock, Money, Percentage, UnitId, UserId};
use domain_allocation::{AllocationSetting, Lease, Property, UtilityType};

use crate::bill::NewBill;
use crate::memory::InMemoryStore;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub owner: UserId,
    pub property: Property,
    pub leases: Vec<Lease>,
}

impl Fixture {
    /// One property with two active leases, A in unit 1 and B in unit 2
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let owner = UserId::new();
        let property = Property::new(owner, "Maple Court");
        let leases = vec![
            Lease::new(property.id, "Alice", date(2023, 1, 1)).with_unit(UnitId::new(), "1"),
            Lease::new(property.id, "Bob", date(2023, 1, 1)).with_unit(UnitId::new(), "2"),
        ];
        store.add_property(property.clone()).await;
        for lease in &leases {
            store.add_lease(lease.clone()).await;
        }
        Self {
            store,
            clock: Arc::new(FixedClock::on(date(2024, 3, 15))),
            owner,
            property,
            leases,
        }
    }

    pub async fn split(&self, utility_type: UtilityType, shares: &[Decimal]) {
        for (lease, pct) in self.leases.iter().zip(shares) {
            self.store
                .add_setting(AllocationSetting::new(lease.id, utility_type, Percentage::new(*pct).unwrap()))
                .await;
        }
    }

    pub fn bill(&self, utility_type: UtilityType, month: &str, amount: Decimal) -> NewBill {
        let billing_month: BillingMonth = month.parse().unwrap();
        NewBill {
            property_id: self.property.id,
            utility_type,
            provider: format!("{} Co", utility_type),
            billing_month,
            total_amount: usd(amount),
            due_date: billing_month.day_offset(24).unwrap(),
            bill_date: billing_month.first_day(),
            notes: None,
            document_id: None,
        }
    }
}
