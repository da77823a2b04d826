//! Charge calculator
//!
//! Turns a bill plus the current responsibility settings into per-lease
//! charges. Only active leases with a non-zero share are charged; whatever the
//! tenants do not cover is the owner's share and produces no record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::{ChargeId, LeaseId, Money, Percentage};
use domain_allocation::{AllocationSetting, AllocationStore, AllocationStoreExt, Lease, UtilityType};

use crate::bill::UtilityBill;
use crate::charge::TenantUtilityCharge;
use crate::error::BillingError;

/// Stateless calculator for bill splits
pub struct ChargeCalculator;

impl ChargeCalculator {
    /// Computes the charges for `bill`
    ///
    /// # Errors
    ///
    /// `AllocationExceeded` when the charged leases' shares total more than
    /// 100%. No charges are returned in that case.
    pub fn compute(
        bill: &UtilityBill,
        leases: &[Lease],
        settings: &[AllocationSetting],
        now: DateTime<Utc>,
    ) -> Result<Vec<TenantUtilityCharge>, BillingError> {
        let mut charged: Vec<&Lease> = leases
            .iter()
            .filter(|l| l.is_active() && l.property_id == bill.property_id)
            .collect();
        charged.sort_by_key(|l| l.display_key());

        let mut total = Decimal::ZERO;
        let mut charges = Vec::new();
        for lease in charged {
            let Some(percentage) = share_of(settings, lease.id, bill.utility_type) else {
                continue;
            };
            total += percentage.value();
            charges.push(TenantUtilityCharge {
                id: ChargeId::new_v7(),
                bill_id: bill.id,
                lease_id: lease.id,
                property_id: bill.property_id,
                owner_id: bill.owner_id,
                tenant_name: lease.tenant_name.clone(),
                unit_label: lease.unit_label.clone(),
                charged_amount: bill.total_amount.share(percentage),
                responsibility_percentage: percentage,
                due_date: bill.due_date,
                is_paid: false,
                paid_date: None,
                notes: None,
                created_at: now,
                updated_at: now,
            });
        }

        if total > Decimal::ONE_HUNDRED {
            return Err(BillingError::AllocationExceeded {
                utility_type: bill.utility_type,
                total: total.normalize(),
            });
        }

        debug!(bill_id = %bill.id, charges = charges.len(), %total, "Computed charges");
        Ok(charges)
    }

    /// Shows how `total` would be split without writing anything
    ///
    /// Leases without a setting are listed at 0% so the owner can see who is
    /// missing.
    pub fn preview(
        total: Money,
        utility_type: UtilityType,
        leases: &[Lease],
        settings: &[AllocationSetting],
    ) -> SplitPreview {
        let mut active: Vec<&Lease> = leases.iter().filter(|l| l.is_active()).collect();
        active.sort_by_key(|l| l.display_key());

        let lines: Vec<PreviewLine> = active
            .iter()
            .map(|lease| {
                let percentage = share_of(settings, lease.id, utility_type).unwrap_or(Percentage::ZERO);
                PreviewLine {
                    lease_id: lease.id,
                    tenant_name: lease.tenant_name.clone(),
                    unit_label: lease.unit_label.clone(),
                    percentage: percentage.value(),
                    amount: total.share(percentage),
                    has_setting: !percentage.is_zero(),
                }
            })
            .collect();

        let tenant_percentage: Decimal = lines.iter().map(|l| l.percentage).sum();
        let tenant_total = lines
            .iter()
            .fold(Money::zero(total.currency()), |acc, l| acc + l.amount);
        let owner_amount = total - tenant_total;
        let leases_with_settings = lines.iter().filter(|l| l.has_setting).count();
        let total_leases = lines.len();

        let (is_valid, message) = if tenant_percentage > Decimal::ONE_HUNDRED {
            (
                false,
                format!(
                    "Utility percentages for {} sum to {}%, which exceeds 100%",
                    utility_type,
                    tenant_percentage.normalize()
                ),
            )
        } else if leases_with_settings == 0 {
            (true, format!("No utility responsibility settings found for {}", utility_type))
        } else if leases_with_settings < total_leases {
            (
                true,
                format!(
                    "{} of {} leases have {} settings configured",
                    leases_with_settings, total_leases, utility_type
                ),
            )
        } else {
            (true, "All leases have utility settings configured".to_string())
        };

        SplitPreview {
            utility_type,
            total_amount: total,
            lines,
            tenant_percentage,
            owner_percentage: Percentage::remainder_of(tenant_percentage),
            owner_amount: if owner_amount.is_negative() {
                Money::zero(total.currency())
            } else {
                owner_amount
            },
            leases_with_settings,
            total_leases,
            is_valid,
            message,
        }
    }

    /// Loads the property's active leases and settings, then computes
    pub async fn compute_for<S>(store: &S, bill: &UtilityBill, now: DateTime<Utc>) -> Result<Vec<TenantUtilityCharge>, BillingError>
    where
        S: AllocationStore + ?Sized,
    {
        let leases = store.active_leases(bill.property_id).await?;
        let settings = store.allocations_for_property(bill.property_id).await?;
        Self::compute(bill, &leases, &settings, now)
    }
}

fn share_of(settings: &[AllocationSetting], lease_id: LeaseId, utility_type: UtilityType) -> Option<Percentage> {
    settings
        .iter()
        .find(|s| s.lease_id == lease_id && s.utility_type == utility_type)
        .map(|s| s.percentage)
        .filter(|p| !p.is_zero())
}

/// What the owner still carries after tenant charges
pub fn owner_share(bill: &UtilityBill, charges: &[TenantUtilityCharge]) -> Money {
    let currency = bill.total_amount.currency();
    let tenants = charges
        .iter()
        .fold(Money::zero(currency), |acc, c| acc + c.charged_amount);
    bill.total_amount - tenants
}

/// One lease in a split preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewLine {
    pub lease_id: LeaseId,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub percentage: Decimal,
    pub amount: Money,
    pub has_setting: bool,
}

/// A dry run of the charge calculation for an amount not yet billed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPreview {
    pub utility_type: UtilityType,
    pub total_amount: Money,
    pub lines: Vec<PreviewLine>,
    pub tenant_percentage: Decimal,
    pub owner_percentage: Decimal,
    pub owner_amount: Money,
    pub leases_with_settings: usize,
    pub total_leases: usize,
    pub is_valid: bool,
    pub message: String,
}
