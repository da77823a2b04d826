//! In-memory store
//!
//! Backs the engine when no database is configured and in tests. All data
//! sits behind one `RwLock`, so every write method is atomic with respect to
//! every reader.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use core_kernel::{
    AdapterHealth, BillingMonth, ChargeId, DomainPort, HealthCheckResult, HealthCheckable, LeaseId,
    PortError, PropertyId, UserId, UtilityBillId,
};
use domain_allocation::{AllocationSetting, AllocationStore, Lease, Property, UtilityType};

use crate::bill::{BillQuery, UtilityBill};
use crate::charge::TenantUtilityCharge;
use crate::payment::UtilityPayment;
use crate::ports::{BillingStore, ChargeQuery, LedgerOutcome, LedgerWrite, PaymentQuery};

#[derive(Debug, Default)]
struct State {
    properties: HashMap<PropertyId, Property>,
    leases: HashMap<LeaseId, Lease>,
    settings: Vec<AllocationSetting>,
    bills: HashMap<UtilityBillId, UtilityBill>,
    charges: HashMap<ChargeId, TenantUtilityCharge>,
    entries: Vec<UtilityPayment>,
}

impl State {
    fn has_duplicate(&self, bill: &UtilityBill) -> bool {
        self.bills.values().any(|b| {
            b.id != bill.id
                && b.property_id == bill.property_id
                && b.utility_type == bill.utility_type
                && b.billing_month == bill.billing_month
        })
    }

    fn duplicate_error(bill: &UtilityBill) -> PortError {
        PortError::conflict(format!(
            "{} bill for {} already exists on property {}",
            bill.utility_type, bill.billing_month, bill.property_id
        ))
    }
}

/// Process-local implementation of every store port
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a property; tenancy data is owned elsewhere
    pub async fn add_property(&self, property: Property) {
        self.state.write().await.properties.insert(property.id, property);
    }

    pub async fn add_lease(&self, lease: Lease) {
        self.state.write().await.leases.insert(lease.id, lease);
    }

    /// Inserts a setting without checking the 100% limit
    pub async fn add_setting(&self, setting: AllocationSetting) {
        self.state.write().await.settings.push(setting);
    }

    /// Number of ledger entries held, across all owners
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

impl DomainPort for InMemoryStore {}

#[async_trait]
impl HealthCheckable for InMemoryStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::new("memory", AdapterHealth::Healthy, 0)
    }
}

#[async_trait]
impl AllocationStore for InMemoryStore {
    async fn get_property(&self, id: PropertyId) -> Result<Property, PortError> {
        self.state
            .read()
            .await
            .properties
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Property", id))
    }

    async fn properties_for_owner(&self, owner: UserId) -> Result<Vec<Property>, PortError> {
        let state = self.state.read().await;
        Ok(state.properties.values().filter(|p| p.owner_id == owner).cloned().collect())
    }

    async fn get_lease(&self, id: LeaseId) -> Result<Lease, PortError> {
        self.state
            .read()
            .await
            .leases
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Lease", id))
    }

    async fn leases_for_property(&self, property_id: PropertyId) -> Result<Vec<Lease>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .leases
            .values()
            .filter(|l| l.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn allocations_for_lease(&self, lease_id: LeaseId) -> Result<Vec<AllocationSetting>, PortError> {
        let state = self.state.read().await;
        Ok(state.settings.iter().filter(|s| s.lease_id == lease_id).cloned().collect())
    }

    async fn allocations_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Vec<AllocationSetting>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .settings
            .iter()
            .filter(|s| {
                state
                    .leases
                    .get(&s.lease_id)
                    .map_or(false, |l| l.property_id == property_id)
            })
            .cloned()
            .collect())
    }

    async fn replace_property_allocations(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let State { leases, settings: current, .. } = &mut *state;
        current.retain(|s| {
            s.utility_type != utility_type
                || leases.get(&s.lease_id).map_or(true, |l| l.property_id != property_id)
        });
        current.extend(settings);
        Ok(())
    }

    async fn replace_lease_allocations(
        &self,
        lease_id: LeaseId,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        state.settings.retain(|s| s.lease_id != lease_id);
        state.settings.extend(settings);
        Ok(())
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn get_bill(&self, id: UtilityBillId) -> Result<UtilityBill, PortError> {
        self.state
            .read()
            .await
            .bills
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("UtilityBill", id))
    }

    async fn find_bill(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        billing_month: BillingMonth,
    ) -> Result<Option<UtilityBill>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .bills
            .values()
            .find(|b| {
                b.property_id == property_id
                    && b.utility_type == utility_type
                    && b.billing_month == billing_month
            })
            .cloned())
    }

    async fn find_bills(&self, query: &BillQuery) -> Result<Vec<UtilityBill>, PortError> {
        let state = self.state.read().await;
        Ok(state.bills.values().filter(|b| query.matches(b)).cloned().collect())
    }

    async fn insert_bill(
        &self,
        bill: UtilityBill,
        charges: Vec<TenantUtilityCharge>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        if state.has_duplicate(&bill) {
            return Err(State::duplicate_error(&bill));
        }
        debug!(bill_id = %bill.id, charges = charges.len(), "Inserting bill");
        state.charges.extend(charges.into_iter().map(|c| (c.id, c)));
        state.bills.insert(bill.id, bill);
        Ok(())
    }

    async fn update_bill(
        &self,
        bill: UtilityBill,
        charges: Option<Vec<TenantUtilityCharge>>,
    ) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        if !state.bills.contains_key(&bill.id) {
            return Err(PortError::not_found("UtilityBill", bill.id));
        }
        if state.has_duplicate(&bill) {
            return Err(State::duplicate_error(&bill));
        }
        if let Some(charges) = charges {
            state.charges.retain(|_, c| c.bill_id != bill.id);
            state.charges.extend(charges.into_iter().map(|c| (c.id, c)));
        }
        state.bills.insert(bill.id, bill);
        Ok(())
    }

    async fn delete_bill(&self, id: UtilityBillId) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        if state.bills.remove(&id).is_none() {
            return Err(PortError::not_found("UtilityBill", id));
        }
        state.charges.retain(|_, c| c.bill_id != id);
        Ok(())
    }

    async fn get_charge(&self, id: ChargeId) -> Result<TenantUtilityCharge, PortError> {
        self.state
            .read()
            .await
            .charges
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("TenantUtilityCharge", id))
    }

    async fn charges_for_bill(&self, bill_id: UtilityBillId) -> Result<Vec<TenantUtilityCharge>, PortError> {
        let state = self.state.read().await;
        Ok(state.charges.values().filter(|c| c.bill_id == bill_id).cloned().collect())
    }

    async fn find_charges(&self, query: &ChargeQuery) -> Result<Vec<TenantUtilityCharge>, PortError> {
        let state = self.state.read().await;
        Ok(state.charges.values().filter(|c| query.matches(c)).cloned().collect())
    }

    async fn entries_for_charge(&self, charge_id: ChargeId) -> Result<Vec<UtilityPayment>, PortError> {
        let state = self.state.read().await;
        Ok(state.entries.iter().filter(|e| e.charge_id == charge_id).cloned().collect())
    }

    async fn entries_for_charges(&self, charge_ids: &[ChargeId]) -> Result<Vec<UtilityPayment>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| charge_ids.contains(&e.charge_id))
            .cloned()
            .collect())
    }

    async fn find_payments(&self, query: &PaymentQuery) -> Result<Vec<UtilityPayment>, PortError> {
        let state = self.state.read().await;
        Ok(state.entries.iter().filter(|e| query.matches(e)).cloned().collect())
    }

    async fn apply_ledger_write(&self, write: LedgerWrite) -> Result<LedgerOutcome, PortError> {
        let mut state = self.state.write().await;
        let charge_id = write.charge.id;
        let bill_id = write.charge.bill_id;
        if !state.charges.contains_key(&charge_id) {
            return Err(PortError::not_found("TenantUtilityCharge", charge_id));
        }
        let bill = state
            .bills
            .get(&bill_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("UtilityBill", bill_id))?;
        let siblings: Vec<TenantUtilityCharge> = state
            .charges
            .values()
            .filter(|c| c.bill_id == bill_id)
            .cloned()
            .collect();
        let entries: Vec<UtilityPayment> = state
            .entries
            .iter()
            .filter(|e| e.charge_id == charge_id)
            .cloned()
            .collect();

        let (entry, outcome) = write.resolve(bill, siblings, &entries)?;
        if let Some(entry) = entry {
            state.entries.push(entry);
        }
        state.charges.insert(charge_id, outcome.charge.clone());
        state.bills.insert(bill_id, outcome.bill.clone());
        Ok(outcome)
    }
}
