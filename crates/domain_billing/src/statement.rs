//! Balance and statement queries
//!
//! Read-only views joining charges, bills, leases and ledger entries. Each
//! view is assembled from several store reads, so a concurrent write can land
//! between them; callers get a view that was true at some point during the
//! call for each entity, not one global snapshot.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use core_kernel::{
    BillingMonth, ChargeId, Clock, Currency, DateRange, LeaseId, Money, PropertyId, UserId, UtilityBillId,
};
use domain_allocation::{Lease, UtilityType};

use crate::bill::{BillQuery, UtilityBill};
use crate::charge::{ChargeBalance, TenantUtilityCharge};
use crate::error::BillingError;
use crate::payment::{PaymentMethod, UtilityPayment};
use crate::ports::{BillingStore, ChargeQuery, PaymentQuery};

/// Optional narrowing for charge and payment reports
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    pub property_id: Option<PropertyId>,
    pub lease_id: Option<LeaseId>,
}

/// An unpaid charge with its bill context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingCharge {
    #[serde(flatten)]
    pub balance: ChargeBalance,
    pub utility_type: UtilityType,
    pub billing_month: BillingMonth,
    pub property_name: String,
}

/// Everything one lease still owes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantOutstanding {
    pub lease_id: LeaseId,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub total_remaining: Money,
    pub charges: Vec<OutstandingCharge>,
}

/// Charged, paid and owed amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTotals {
    pub charged: Money,
    pub paid: Money,
    pub owed: Money,
}

impl BalanceTotals {
    fn zero(currency: Currency) -> Self {
        Self {
            charged: Money::zero(currency),
            paid: Money::zero(currency),
            owed: Money::zero(currency),
        }
    }

    /// Paid is whatever is no longer owed, so `charged = paid + owed`
    fn add(&mut self, balance: &ChargeBalance) -> Result<(), BillingError> {
        let charged = balance.charge.charged_amount;
        self.charged = self.charged.checked_add(&charged)?;
        self.paid = self.paid.checked_add(&charged.checked_sub(&balance.remaining)?)?;
        self.owed = self.owed.checked_add(&balance.remaining)?;
        Ok(())
    }
}

/// A lease's utility balance, overall and per utility type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseBalance {
    pub lease_id: LeaseId,
    pub tenant_name: String,
    #[serde(flatten)]
    pub totals: BalanceTotals,
    pub by_utility_type: BTreeMap<UtilityType, BalanceTotals>,
}

/// One charge on a tenant statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    #[serde(flatten)]
    pub balance: ChargeBalance,
    pub utility_type: UtilityType,
    pub billing_month: BillingMonth,
    pub bill_date: NaiveDate,
    pub provider: String,
}

/// Charges billed to a lease within a period, with the payments made in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantStatement {
    pub lease_id: LeaseId,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub period: DateRange,
    pub lines: Vec<StatementLine>,
    pub payments: Vec<UtilityPayment>,
    pub summary: BalanceTotals,
}

/// A ledger entry with its bill and lease context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(flatten)]
    pub entry: UtilityPayment,
    pub utility_type: Option<UtilityType>,
    pub billing_month: Option<BillingMonth>,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub property_name: String,
}

/// Total and count for one payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub total: Money,
    pub count: usize,
}

/// Aggregates over the payment ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    /// Sum of payment entries, before reversals
    pub total_collected: Money,
    pub total_reversed: Money,
    pub net_collected: Money,
    pub payment_count: usize,
    pub this_month_total: Money,
    pub this_month_count: usize,
    pub average_payment: Money,
    pub last_payment_date: Option<NaiveDate>,
    pub last_payment_amount: Option<Money>,
    pub by_method: BTreeMap<PaymentMethod, MethodTotal>,
}

/// The unpaid charge that has been open longest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OldestCharge {
    pub charge_id: ChargeId,
    pub tenant_name: String,
    pub amount: Money,
    pub days_old: i64,
}

/// Outstanding totals across the owner's portfolio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargesSummary {
    pub total_outstanding: Money,
    pub total_charges: usize,
    pub by_utility_type: BTreeMap<UtilityType, Money>,
    pub by_property: BTreeMap<String, Money>,
    pub by_tenant: BTreeMap<String, Money>,
    pub oldest_charge: Option<OldestCharge>,
}

fn accumulate<K: Ord>(map: &mut BTreeMap<K, Money>, key: K, amount: Money) -> Result<(), BillingError> {
    let slot = map.entry(key).or_insert_with(|| Money::zero(amount.currency()));
    *slot = slot.checked_add(&amount)?;
    Ok(())
}

/// Read-only queries over charges and the payment ledger
pub struct StatementService<S: BillingStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    currency: Currency,
}

impl<S: BillingStore + ?Sized> Clone for StatementService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            currency: self.currency,
        }
    }
}

impl<S: BillingStore + ?Sized> StatementService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            currency: Currency::default(),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    async fn owned_lease(&self, user: UserId, lease_id: LeaseId) -> Result<Lease, BillingError> {
        let lease = self.store.get_lease(lease_id).await?;
        let property = self.store.get_property(lease.property_id).await?;
        if !property.is_owned_by(user) {
            return Err(BillingError::permission_denied(lease_id));
        }
        Ok(lease)
    }

    async fn check_filter(&self, user: UserId, filter: &ReportFilter) -> Result<(), BillingError> {
        if let Some(property_id) = filter.property_id {
            let property = self.store.get_property(property_id).await?;
            if !property.is_owned_by(user) {
                return Err(BillingError::permission_denied(property_id));
            }
        }
        if let Some(lease_id) = filter.lease_id {
            self.owned_lease(user, lease_id).await?;
        }
        Ok(())
    }

    async fn bills_by_id(&self, user: UserId) -> Result<HashMap<UtilityBillId, UtilityBill>, BillingError> {
        Ok(self
            .store
            .find_bills(&BillQuery::for_owner(user))
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect())
    }

    async fn property_names(&self, user: UserId) -> Result<HashMap<PropertyId, String>, BillingError> {
        Ok(self
            .store
            .properties_for_owner(user)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect())
    }

    async fn balances(&self, charges: Vec<TenantUtilityCharge>) -> Result<Vec<ChargeBalance>, BillingError> {
        let ids: Vec<ChargeId> = charges.iter().map(|c| c.id).collect();
        let entries = self.store.entries_for_charges(&ids).await?;
        Ok(charges
            .into_iter()
            .map(|c| ChargeBalance::from_entries(c, &entries))
            .collect())
    }

    fn charge_query(user: UserId, filter: &ReportFilter) -> ChargeQuery {
        let query = ChargeQuery::for_owner(user).property(filter.property_id);
        match filter.lease_id {
            Some(lease_id) => query.lease(lease_id),
            None => query,
        }
    }

    /// Unpaid charges grouped by lease, sorted by unit then tenant
    pub async fn outstanding_charges(
        &self,
        user: UserId,
        filter: ReportFilter,
    ) -> Result<Vec<TenantOutstanding>, BillingError> {
        self.check_filter(user, &filter).await?;
        let charges = self
            .store
            .find_charges(&Self::charge_query(user, &filter).unpaid())
            .await?;
        let bills = self.bills_by_id(user).await?;
        let names = self.property_names(user).await?;

        let mut groups: BTreeMap<LeaseId, TenantOutstanding> = BTreeMap::new();
        for balance in self.balances(charges).await? {
            let Some(bill) = bills.get(&balance.charge.bill_id) else {
                continue;
            };
            let charge = &balance.charge;
            let group = groups.entry(charge.lease_id).or_insert_with(|| TenantOutstanding {
                lease_id: charge.lease_id,
                tenant_name: charge.tenant_name.clone(),
                unit_label: charge.unit_label.clone(),
                total_remaining: Money::zero(self.currency),
                charges: Vec::new(),
            });
            group.total_remaining = group.total_remaining.checked_add(&balance.remaining)?;
            group.charges.push(OutstandingCharge {
                utility_type: bill.utility_type,
                billing_month: bill.billing_month,
                property_name: names.get(&bill.property_id).cloned().unwrap_or_default(),
                balance,
            });
        }

        let mut tenants: Vec<TenantOutstanding> = groups.into_values().collect();
        for tenant in &mut tenants {
            tenant.charges.sort_by(|a, b| {
                a.balance
                    .charge
                    .due_date
                    .cmp(&b.balance.charge.due_date)
                    .then(a.utility_type.cmp(&b.utility_type))
            });
        }
        tenants.sort_by(|a, b| {
            (a.unit_label.as_deref().unwrap_or(""), a.tenant_name.as_str())
                .cmp(&(b.unit_label.as_deref().unwrap_or(""), b.tenant_name.as_str()))
        });
        Ok(tenants)
    }

    /// Charged, paid and owed totals for one lease, overall and by utility type
    pub async fn balance_for_lease(&self, user: UserId, lease_id: LeaseId) -> Result<LeaseBalance, BillingError> {
        let lease = self.owned_lease(user, lease_id).await?;
        let charges = self
            .store
            .find_charges(&ChargeQuery::for_owner(user).lease(lease_id))
            .await?;
        let bills = self.bills_by_id(user).await?;

        let mut totals = BalanceTotals::zero(self.currency);
        let mut by_utility_type: BTreeMap<UtilityType, BalanceTotals> = BTreeMap::new();
        for balance in self.balances(charges).await? {
            let Some(bill) = bills.get(&balance.charge.bill_id) else {
                continue;
            };
            totals.add(&balance)?;
            by_utility_type
                .entry(bill.utility_type)
                .or_insert_with(|| BalanceTotals::zero(self.currency))
                .add(&balance)?;
        }

        Ok(LeaseBalance {
            lease_id,
            tenant_name: lease.tenant_name,
            totals,
            by_utility_type,
        })
    }

    /// Charges whose bill date falls in `period`, sorted by bill date then utility type
    pub async fn tenant_statement(
        &self,
        user: UserId,
        lease_id: LeaseId,
        period: DateRange,
    ) -> Result<TenantStatement, BillingError> {
        let lease = self.owned_lease(user, lease_id).await?;
        let charges = self
            .store
            .find_charges(&ChargeQuery::for_owner(user).lease(lease_id))
            .await?;
        let bills = self.bills_by_id(user).await?;

        let mut summary = BalanceTotals::zero(self.currency);
        let mut lines = Vec::new();
        for balance in self.balances(charges).await? {
            let Some(bill) = bills.get(&balance.charge.bill_id) else {
                continue;
            };
            if !period.contains(bill.bill_date) {
                continue;
            }
            summary.add(&balance)?;
            lines.push(StatementLine {
                utility_type: bill.utility_type,
                billing_month: bill.billing_month,
                bill_date: bill.bill_date,
                provider: bill.provider.clone(),
                balance,
            });
        }
        lines.sort_by(|a, b| a.bill_date.cmp(&b.bill_date).then(a.utility_type.cmp(&b.utility_type)));

        let mut payments = self
            .store
            .find_payments(&PaymentQuery::for_owner(user).lease(Some(lease_id)).between(Some(period)))
            .await?;
        payments.sort_by(|a, b| a.payment_date.cmp(&b.payment_date).then(a.created_at.cmp(&b.created_at)));

        Ok(TenantStatement {
            lease_id,
            tenant_name: lease.tenant_name,
            unit_label: lease.unit_label,
            period,
            lines,
            payments,
            summary,
        })
    }

    /// Ledger entries newest first, with bill and lease context
    pub async fn payment_history(
        &self,
        user: UserId,
        filter: ReportFilter,
        period: Option<DateRange>,
    ) -> Result<Vec<PaymentRecord>, BillingError> {
        self.check_filter(user, &filter).await?;
        let mut entries = self
            .store
            .find_payments(
                &PaymentQuery::for_owner(user)
                    .property(filter.property_id)
                    .lease(filter.lease_id)
                    .between(period),
            )
            .await?;
        entries.sort_by(|a, b| b.payment_date.cmp(&a.payment_date).then(b.created_at.cmp(&a.created_at)));

        let bills = self.bills_by_id(user).await?;
        let names = self.property_names(user).await?;
        let ids: Vec<ChargeId> = entries.iter().map(|e| e.charge_id).collect();
        let charges: HashMap<ChargeId, TenantUtilityCharge> = self
            .store
            .find_charges(&ChargeQuery::for_owner(user).property(filter.property_id))
            .await?
            .into_iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| (c.id, c))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let bill = bills.get(&entry.bill_id);
                let charge = charges.get(&entry.charge_id);
                PaymentRecord {
                    utility_type: bill.map(|b| b.utility_type),
                    billing_month: bill.map(|b| b.billing_month),
                    tenant_name: charge.map(|c| c.tenant_name.clone()).unwrap_or_default(),
                    unit_label: charge.and_then(|c| c.unit_label.clone()),
                    property_name: names.get(&entry.property_id).cloned().unwrap_or_default(),
                    entry,
                }
            })
            .collect())
    }

    /// Totals, this-month figures and a per-method breakdown of payments
    pub async fn payment_summary(&self, user: UserId, filter: ReportFilter) -> Result<PaymentSummary, BillingError> {
        self.check_filter(user, &filter).await?;
        let mut entries = self
            .store
            .find_payments(
                &PaymentQuery::for_owner(user)
                    .property(filter.property_id)
                    .lease(filter.lease_id),
            )
            .await?;
        entries.sort_by(|a, b| b.payment_date.cmp(&a.payment_date).then(b.created_at.cmp(&a.created_at)));

        let zero = Money::zero(self.currency);
        let today = self.clock.today();
        let mut summary = PaymentSummary {
            total_collected: zero,
            total_reversed: zero,
            net_collected: zero,
            payment_count: 0,
            this_month_total: zero,
            this_month_count: 0,
            average_payment: zero,
            last_payment_date: None,
            last_payment_amount: None,
            by_method: BTreeMap::new(),
        };

        for entry in &entries {
            if !entry.is_payment() {
                summary.total_reversed = summary.total_reversed.checked_add(&entry.amount.abs())?;
                continue;
            }
            summary.total_collected = summary.total_collected.checked_add(&entry.amount)?;
            summary.payment_count += 1;
            if entry.payment_date.year() == today.year() && entry.payment_date.month() == today.month() {
                summary.this_month_total = summary.this_month_total.checked_add(&entry.amount)?;
                summary.this_month_count += 1;
            }
            if summary.last_payment_date.is_none() {
                summary.last_payment_date = Some(entry.payment_date);
                summary.last_payment_amount = Some(entry.amount);
            }
            let method = summary.by_method.entry(entry.method).or_insert(MethodTotal {
                total: zero,
                count: 0,
            });
            method.total = method.total.checked_add(&entry.amount)?;
            method.count += 1;
        }

        summary.net_collected = summary.total_collected.checked_sub(&summary.total_reversed)?;
        if summary.payment_count > 0 {
            summary.average_payment = summary
                .total_collected
                .multiply(Decimal::ONE / Decimal::from(summary.payment_count as u64))
                .round_to_currency();
        }
        Ok(summary)
    }

    /// Outstanding totals with breakdowns and the oldest open charge
    pub async fn charges_summary(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
    ) -> Result<ChargesSummary, BillingError> {
        let filter = ReportFilter {
            property_id,
            lease_id: None,
        };
        self.check_filter(user, &filter).await?;
        let charges = self
            .store
            .find_charges(&Self::charge_query(user, &filter).unpaid())
            .await?;
        let bills = self.bills_by_id(user).await?;
        let names = self.property_names(user).await?;

        let mut summary = ChargesSummary {
            total_outstanding: Money::zero(self.currency),
            total_charges: 0,
            by_utility_type: BTreeMap::new(),
            by_property: BTreeMap::new(),
            by_tenant: BTreeMap::new(),
            oldest_charge: None,
        };
        let mut oldest: Option<&ChargeBalance> = None;
        let balances = self.balances(charges).await?;
        for balance in &balances {
            let Some(bill) = bills.get(&balance.charge.bill_id) else {
                continue;
            };
            let remaining = balance.remaining;
            summary.total_outstanding = summary.total_outstanding.checked_add(&remaining)?;
            summary.total_charges += 1;
            accumulate(&mut summary.by_utility_type, bill.utility_type, remaining)?;
            let property = names.get(&bill.property_id).cloned().unwrap_or_default();
            accumulate(&mut summary.by_property, property, remaining)?;
            accumulate(&mut summary.by_tenant, balance.charge.tenant_name.clone(), remaining)?;
            if oldest.map_or(true, |o| balance.charge.created_at < o.charge.created_at) {
                oldest = Some(balance);
            }
        }

        let today = self.clock.today();
        summary.oldest_charge = oldest.map(|b| OldestCharge {
            charge_id: b.charge.id,
            tenant_name: b.charge.tenant_name.clone(),
            amount: b.remaining,
            days_old: (today - b.charge.created_at.date_naive()).num_days().max(0),
        });
        Ok(summary)
    }
}
