//! PostgreSQL store adapter
//!
//! `PostgresStore` is the database implementation of both store ports. It
//! delegates to the repositories and translates `DatabaseError` into
//! `PortError` at the boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{adapters::PostgresStore, create_pool, DatabaseConfig};
//! use domain_billing::BillService;
//! use std::sync::Arc;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/utility_billing")).await?;
//! let store = Arc::new(PostgresStore::new(pool));
//! let bills = BillService::new(store, clock);
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, BillingMonth, ChargeId, DomainPort, HealthCheckResult, HealthCheckable, LeaseId,
    PortError, PropertyId, UserId, UtilityBillId,
};
use domain_allocation::{AllocationSetting, AllocationStore, Lease, Property, UtilityType};
use domain_billing::{
    BillQuery, BillingStore, ChargeQuery, LedgerOutcome, LedgerWrite, PaymentQuery, TenantUtilityCharge,
    UtilityBill, UtilityPayment,
};

use crate::error::DatabaseError;
use crate::repositories::{BillRepository, LedgerRepository, TenancyRepository};

/// PostgreSQL-backed implementation of `AllocationStore` and `BillingStore`
///
/// # Error Handling
///
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - duplicate bill or a charge still referenced by the ledger -> `PortError::Conflict`
/// - check constraint violations -> `PortError::Validation`
/// - other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresStore {
    tenancy: TenancyRepository,
    bills: BillRepository,
    ledger: LedgerRepository,
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tenancy: TenancyRepository::new(pool.clone()),
            bills: BillRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    /// Tenancy repository, for mirroring properties and leases in
    pub fn tenancy(&self) -> &TenancyRepository {
        &self.tenancy
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn port<T>(result: Result<T, DatabaseError>) -> Result<T, PortError> {
    result.map_err(PortError::from)
}

impl DomainPort for PostgresStore {}

/// Probe latency above which the store reports itself degraded
const SLOW_PROBE_MS: u64 = 500;

#[async_trait]
impl HealthCheckable for PostgresStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) if latency_ms > SLOW_PROBE_MS => {
                HealthCheckResult::new("postgres", AdapterHealth::Degraded, latency_ms)
                    .with_message(format!("SELECT 1 took {}ms", latency_ms))
            }
            Ok(_) => HealthCheckResult::new("postgres", AdapterHealth::Healthy, latency_ms),
            Err(e) => HealthCheckResult::new("postgres", AdapterHealth::Unhealthy, latency_ms)
                .with_message(format!("Database error: {}", e)),
        }
    }
}

#[async_trait]
impl AllocationStore for PostgresStore {
    async fn get_property(&self, id: PropertyId) -> Result<Property, PortError> {
        port(self.tenancy.get_property(id.into()).await)
    }

    async fn properties_for_owner(&self, owner: UserId) -> Result<Vec<Property>, PortError> {
        port(self.tenancy.properties_for_owner(owner.into()).await)
    }

    async fn get_lease(&self, id: LeaseId) -> Result<Lease, PortError> {
        port(self.tenancy.get_lease(id.into()).await)
    }

    async fn leases_for_property(&self, property_id: PropertyId) -> Result<Vec<Lease>, PortError> {
        port(self.tenancy.leases_for_property(property_id.into()).await)
    }

    async fn allocations_for_lease(&self, lease_id: LeaseId) -> Result<Vec<AllocationSetting>, PortError> {
        port(self.tenancy.settings_for_lease(lease_id.into()).await)
    }

    async fn allocations_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Vec<AllocationSetting>, PortError> {
        port(self.tenancy.settings_for_property(property_id.into()).await)
    }

    #[instrument(skip(self, settings), fields(count = settings.len()))]
    async fn replace_property_allocations(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError> {
        port(
            self.tenancy
                .replace_property_settings(property_id.into(), utility_type, &settings)
                .await,
        )
    }

    #[instrument(skip(self, settings), fields(count = settings.len()))]
    async fn replace_lease_allocations(
        &self,
        lease_id: LeaseId,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError> {
        port(self.tenancy.replace_lease_settings(lease_id.into(), &settings).await)
    }
}

#[async_trait]
impl BillingStore for PostgresStore {
    async fn get_bill(&self, id: UtilityBillId) -> Result<UtilityBill, PortError> {
        port(self.bills.get(id.into()).await)
    }

    async fn find_bill(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        billing_month: BillingMonth,
    ) -> Result<Option<UtilityBill>, PortError> {
        port(self.bills.find_one(property_id.into(), utility_type, billing_month).await)
    }

    async fn find_bills(&self, query: &BillQuery) -> Result<Vec<UtilityBill>, PortError> {
        port(self.bills.find(query).await)
    }

    #[instrument(skip(self, bill, charges), fields(bill_id = %bill.id))]
    async fn insert_bill(
        &self,
        bill: UtilityBill,
        charges: Vec<TenantUtilityCharge>,
    ) -> Result<(), PortError> {
        match self.bills.insert(&bill, &charges).await {
            Err(DatabaseError::DuplicateEntry(_)) => Err(PortError::conflict(format!(
                "{} bill for {} already exists on property {}",
                bill.utility_type, bill.billing_month, bill.property_id
            ))),
            other => port(other),
        }
    }

    #[instrument(skip(self, bill, charges), fields(bill_id = %bill.id))]
    async fn update_bill(
        &self,
        bill: UtilityBill,
        charges: Option<Vec<TenantUtilityCharge>>,
    ) -> Result<(), PortError> {
        port(self.bills.update(&bill, charges.as_deref()).await)
    }

    #[instrument(skip(self))]
    async fn delete_bill(&self, id: UtilityBillId) -> Result<(), PortError> {
        port(self.bills.delete(id.into()).await)
    }

    async fn get_charge(&self, id: ChargeId) -> Result<TenantUtilityCharge, PortError> {
        port(self.bills.get_charge(id.into()).await)
    }

    async fn charges_for_bill(&self, bill_id: UtilityBillId) -> Result<Vec<TenantUtilityCharge>, PortError> {
        port(self.bills.charges_for_bill(bill_id.into()).await)
    }

    async fn find_charges(&self, query: &ChargeQuery) -> Result<Vec<TenantUtilityCharge>, PortError> {
        port(self.bills.find_charges(query).await)
    }

    async fn entries_for_charge(&self, charge_id: ChargeId) -> Result<Vec<UtilityPayment>, PortError> {
        port(self.ledger.entries_for_charges(&[charge_id.into()]).await)
    }

    async fn entries_for_charges(&self, charge_ids: &[ChargeId]) -> Result<Vec<UtilityPayment>, PortError> {
        let ids: Vec<Uuid> = charge_ids.iter().copied().map(Uuid::from).collect();
        port(self.ledger.entries_for_charges(&ids).await)
    }

    async fn find_payments(&self, query: &PaymentQuery) -> Result<Vec<UtilityPayment>, PortError> {
        port(self.ledger.find(query).await)
    }

    #[instrument(skip(self, write), fields(charge_id = %write.charge.id))]
    async fn apply_ledger_write(&self, write: LedgerWrite) -> Result<LedgerOutcome, PortError> {
        port(self.ledger.apply(write).await)
    }
}
