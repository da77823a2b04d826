//! Pre-built Test Fixtures
//!
//! A landlord with one property and two active leases on an in-memory
//! store, with the clock pinned to 15 March 2024.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use core_kernel::{Clock, Currency, FixedClock, Money, Percentage, UserId};
use domain_allocation::{AllocationManager, AllocationSetting, Lease, Property, UtilityType};
use domain_billing::{BillService, InMemoryStore, PaymentLedger, StatementService};

use crate::builders::PropertyBuilder;

/// Builds a date, panicking on an impossible one
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

/// The date every fixture clock reports as today
pub fn fixture_today() -> NaiveDate {
    date(2024, 3, 15)
}

/// One owner, one property, two active leases
pub struct Landlord {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub owner: UserId,
    pub property: Property,
    pub leases: Vec<Lease>,
}

impl Landlord {
    pub async fn new() -> Self {
        Self::with_leases(&["Alice", "Bob"]).await
    }

    /// A property with one active lease per tenant name, units numbered from 1
    pub async fn with_leases(tenants: &[&str]) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let owner = UserId::new();
        let (property, leases) = PropertyBuilder::new(owner).tenants(tenants).seed(&store).await;
        Self {
            store,
            clock: Arc::new(FixedClock::on(fixture_today())),
            owner,
            property,
            leases,
        }
    }

    pub fn lease(&self, index: usize) -> &Lease {
        &self.leases[index]
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Writes settings directly, one share per lease in order
    pub async fn split(&self, utility_type: UtilityType, shares: &[Decimal]) {
        for (lease, pct) in self.leases.iter().zip(shares) {
            self.store
                .add_setting(AllocationSetting::new(lease.id, utility_type, Percentage::new(*pct).unwrap()))
                .await;
        }
    }

    pub fn allocations(&self) -> AllocationManager<InMemoryStore> {
        AllocationManager::new(self.store.clone())
    }

    pub fn bills(&self) -> BillService<InMemoryStore> {
        BillService::new(self.store.clone(), self.clock())
    }

    pub fn ledger(&self) -> PaymentLedger<InMemoryStore> {
        PaymentLedger::new(self.store.clone(), self.clock())
    }

    pub fn statements(&self) -> StatementService<InMemoryStore> {
        StatementService::new(self.store.clone(), self.clock())
    }
}
