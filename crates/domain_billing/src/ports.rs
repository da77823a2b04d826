//! Billing Domain Ports
//!
//! `BillingStore` extends the allocation store with bills, charges and the
//! payment ledger. The engine needs both halves in one place because a bill
//! write reads the current allocation settings.
//!
//! # Atomicity
//!
//! - `insert_bill` writes a bill and its charges together
//! - `update_bill` with `Some(charges)` swaps the bill's whole charge set
//! - `apply_ledger_write` re-checks the write against the ledger under the
//!   store's lock or transaction, then appends the entry and saves the charge
//!   and the bill's derived paid state as one unit
//!
//! Readers never observe a bill whose charges are half replaced.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use core_kernel::{
    BillingMonth, ChargeId, DateRange, HealthCheckable, LeaseId, Money, PortError, PropertyId, UserId,
    UtilityBillId,
};
use domain_allocation::{AllocationStore, UtilityType};

use crate::bill::{BillQuery, UtilityBill};
use crate::charge::TenantUtilityCharge;
use crate::payment::UtilityPayment;

/// Filter for charge listings
#[derive(Debug, Clone)]
pub struct ChargeQuery {
    pub owner_id: UserId,
    pub property_id: Option<PropertyId>,
    pub lease_id: Option<LeaseId>,
    pub unpaid_only: bool,
}

impl ChargeQuery {
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            property_id: None,
            lease_id: None,
            unpaid_only: false,
        }
    }

    pub fn property(mut self, property_id: Option<PropertyId>) -> Self {
        self.property_id = property_id;
        self
    }

    pub fn lease(mut self, lease_id: LeaseId) -> Self {
        self.lease_id = Some(lease_id);
        self
    }

    pub fn unpaid(mut self) -> Self {
        self.unpaid_only = true;
        self
    }

    pub fn matches(&self, charge: &TenantUtilityCharge) -> bool {
        charge.owner_id == self.owner_id
            && self.property_id.map_or(true, |p| charge.property_id == p)
            && self.lease_id.map_or(true, |l| charge.lease_id == l)
            && (!self.unpaid_only || !charge.is_paid)
    }
}

/// Filter for ledger listings
#[derive(Debug, Clone)]
pub struct PaymentQuery {
    pub owner_id: UserId,
    pub property_id: Option<PropertyId>,
    pub lease_id: Option<LeaseId>,
    /// Inclusive window on the payment date
    pub range: Option<DateRange>,
}

impl PaymentQuery {
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            property_id: None,
            lease_id: None,
            range: None,
        }
    }

    pub fn property(mut self, property_id: Option<PropertyId>) -> Self {
        self.property_id = property_id;
        self
    }

    pub fn lease(mut self, lease_id: Option<LeaseId>) -> Self {
        self.lease_id = lease_id;
        self
    }

    pub fn between(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn matches(&self, entry: &UtilityPayment) -> bool {
        entry.owner_id == self.owner_id
            && self.property_id.map_or(true, |p| entry.property_id == p)
            && self.lease_id.map_or(true, |l| entry.lease_id == l)
            && self.range.map_or(true, |r| r.contains(entry.payment_date))
    }
}

/// One ledger mutation as the service intends it
///
/// The store turns this into final state with `LedgerWrite::resolve` while
/// it holds the charge's bill locked, so the paid flags never come from a
/// stale read.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    pub entry: Option<UtilityPayment>,
    pub charge: TenantUtilityCharge,
    /// Paid date given to the bill if this write settles it
    pub settled_on: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

/// Charge and bill state left behind by an applied ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub charge: TenantUtilityCharge,
    pub bill: UtilityBill,
    /// Net of the charge's entries including the new one
    pub net_paid: Money,
}

/// Persistence port for bills, charges and ledger entries
#[async_trait]
pub trait BillingStore: AllocationStore + HealthCheckable {
    // ========================================================================
    // Bills
    // ========================================================================

    /// Retrieves a bill by ID, or `PortError::NotFound`
    async fn get_bill(&self, id: UtilityBillId) -> Result<UtilityBill, PortError>;

    /// Finds the bill for a property, utility type and month if there is one
    async fn find_bill(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        billing_month: BillingMonth,
    ) -> Result<Option<UtilityBill>, PortError>;

    /// Lists bills matching `query`, in no particular order
    async fn find_bills(&self, query: &BillQuery) -> Result<Vec<UtilityBill>, PortError>;

    /// Inserts a bill with its charges
    ///
    /// Fails with `PortError::Conflict` if the property already has a bill
    /// for the same utility type and month.
    async fn insert_bill(
        &self,
        bill: UtilityBill,
        charges: Vec<TenantUtilityCharge>,
    ) -> Result<(), PortError>;

    /// Saves a bill, replacing its charge set when `charges` is given
    async fn update_bill(
        &self,
        bill: UtilityBill,
        charges: Option<Vec<TenantUtilityCharge>>,
    ) -> Result<(), PortError>;

    /// Deletes a bill and its charges
    async fn delete_bill(&self, id: UtilityBillId) -> Result<(), PortError>;

    // ========================================================================
    // Charges
    // ========================================================================

    async fn get_charge(&self, id: ChargeId) -> Result<TenantUtilityCharge, PortError>;

    async fn charges_for_bill(&self, bill_id: UtilityBillId) -> Result<Vec<TenantUtilityCharge>, PortError>;

    async fn find_charges(&self, query: &ChargeQuery) -> Result<Vec<TenantUtilityCharge>, PortError>;

    // ========================================================================
    // Ledger
    // ========================================================================

    async fn entries_for_charge(&self, charge_id: ChargeId) -> Result<Vec<UtilityPayment>, PortError>;

    async fn entries_for_charges(&self, charge_ids: &[ChargeId]) -> Result<Vec<UtilityPayment>, PortError>;

    async fn find_payments(&self, query: &PaymentQuery) -> Result<Vec<UtilityPayment>, PortError>;

    /// Applies one ledger mutation atomically
    ///
    /// Fails with `PortError::Conflict` when the write no longer fits the
    /// ledger it is applied to.
    async fn apply_ledger_write(&self, write: LedgerWrite) -> Result<LedgerOutcome, PortError>;
}

/// Convenience reads built on `BillingStore`
#[async_trait]
pub trait BillingStoreExt: BillingStore {
    /// Entries recorded against any charge of a bill
    async fn entries_for_bill(&self, bill_id: UtilityBillId) -> Result<Vec<UtilityPayment>, PortError> {
        let charges = self.charges_for_bill(bill_id).await?;
        let ids: Vec<ChargeId> = charges.iter().map(|c| c.id).collect();
        self.entries_for_charges(&ids).await
    }

    /// Bills whose month falls in `[from, to]`, for one owner
    async fn bills_between(
        &self,
        owner_id: UserId,
        property_id: Option<PropertyId>,
        from: BillingMonth,
        to: BillingMonth,
    ) -> Result<Vec<UtilityBill>, PortError> {
        let query = BillQuery::for_owner(owner_id).property(property_id).months(from, to);
        self.find_bills(&query).await
    }
}

impl<T: BillingStore + ?Sized> BillingStoreExt for T {}
