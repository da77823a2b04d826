//! Test Data Builders

use chrono::NaiveDate;
use fake::{faker::name::en::Name, Fake};
use rust_decimal::Decimal;

use core_kernel::{BillingMonth, DocumentId, PropertyId, UnitId, UserId};
use domain_allocation::{Lease, LeaseStatus, Property, UtilityType};
use domain_billing::{InMemoryStore, NewBill};

use crate::fixtures::{date, usd};

/// Builds a property and its leases, then seeds them into a store
pub struct PropertyBuilder {
    owner: UserId,
    name: String,
    tenants: Vec<(String, LeaseStatus)>,
    lease_start: NaiveDate,
}

impl PropertyBuilder {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            name: "Maple Court".to_string(),
            tenants: Vec::new(),
            lease_start: date(2023, 1, 1),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn tenants(mut self, names: &[&str]) -> Self {
        self.tenants
            .extend(names.iter().map(|n| (n.to_string(), LeaseStatus::Active)));
        self
    }

    /// Adds an active lease for a randomly named tenant
    pub fn random_tenant(mut self) -> Self {
        let name: String = Name().fake();
        self.tenants.push((name, LeaseStatus::Active));
        self
    }

    pub fn tenant_with_status(mut self, name: &str, status: LeaseStatus) -> Self {
        self.tenants.push((name.to_string(), status));
        self
    }

    pub fn build(self) -> (Property, Vec<Lease>) {
        let property = Property::new(self.owner, self.name);
        let leases = self
            .tenants
            .into_iter()
            .enumerate()
            .map(|(i, (tenant, status))| {
                Lease::new(property.id, tenant, self.lease_start)
                    .with_unit(UnitId::new(), (i + 1).to_string())
                    .with_status(status)
            })
            .collect();
        (property, leases)
    }

    pub async fn seed(self, store: &InMemoryStore) -> (Property, Vec<Lease>) {
        let (property, leases) = self.build();
        store.add_property(property.clone()).await;
        for lease in &leases {
            store.add_lease(lease.clone()).await;
        }
        (property, leases)
    }
}

/// Builds a `NewBill` with sensible defaults: USD, due on the 20th of the
/// billing month, dated the 1st
pub struct BillBuilder {
    property_id: PropertyId,
    utility_type: UtilityType,
    provider: String,
    billing_month: BillingMonth,
    amount: Decimal,
    due_date: Option<NaiveDate>,
    bill_date: Option<NaiveDate>,
    notes: Option<String>,
    document_id: Option<DocumentId>,
}

impl BillBuilder {
    pub fn new(property_id: PropertyId, utility_type: UtilityType) -> Self {
        Self {
            property_id,
            utility_type,
            provider: "City Utilities".to_string(),
            billing_month: BillingMonth::of(date(2024, 3, 1)),
            amount: Decimal::ONE_HUNDRED,
            due_date: None,
            bill_date: None,
            notes: None,
            document_id: None,
        }
    }

    pub fn month(mut self, month: &str) -> Self {
        self.billing_month = month.parse().unwrap();
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn build(self) -> NewBill {
        let first = self.billing_month.first_day();
        NewBill {
            property_id: self.property_id,
            utility_type: self.utility_type,
            provider: self.provider,
            billing_month: self.billing_month,
            total_amount: usd(self.amount),
            due_date: self
                .due_date
                .unwrap_or_else(|| first + chrono::Duration::days(19)),
            bill_date: self.bill_date.unwrap_or(first),
            notes: self.notes,
            document_id: self.document_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_property_builder_numbers_units() {
        let (property, leases) = PropertyBuilder::new(UserId::new())
            .tenants(&["A", "B"])
            .random_tenant()
            .build();
        assert_eq!(leases.len(), 3);
        assert!(leases.iter().all(|l| l.property_id == property.id));
        assert_eq!(leases[2].unit_label.as_deref(), Some("3"));
    }

    #[test]
    fn test_bill_builder_defaults() {
        let bill = BillBuilder::new(PropertyId::new(), UtilityType::Water)
            .month("2024-02")
            .amount(dec!(80))
            .build();
        assert_eq!(bill.due_date, date(2024, 2, 20));
        assert_eq!(bill.bill_date, date(2024, 2, 1));
        assert_eq!(bill.total_amount, usd(dec!(80)));
    }
}
