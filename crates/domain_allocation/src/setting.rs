//! Responsibility settings and the 100% ceiling

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use core_kernel::{AllocationId, LeaseId, Percentage, PropertyId};
use crate::error::AllocationError;
use crate::utility::UtilityType;

/// Share of one utility type a lease is responsible for
///
/// The absence of a setting means 0%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSetting {
    pub id: AllocationId,
    pub lease_id: LeaseId,
    pub utility_type: UtilityType,
    pub percentage: Percentage,
    pub updated_at: DateTime<Utc>,
}

impl AllocationSetting {
    pub fn new(lease_id: LeaseId, utility_type: UtilityType, percentage: Percentage) -> Self {
        Self {
            id: AllocationId::new_v7(),
            lease_id,
            utility_type,
            percentage,
            updated_at: Utc::now(),
        }
    }
}

/// Requested share for one lease when replacing a property's split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseShare {
    pub lease_id: LeaseId,
    pub percentage: Decimal,
}

/// Requested share for one utility type when replacing a lease's settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityShare {
    pub utility_type: UtilityType,
    pub percentage: Decimal,
}

/// One lease's line in an allocation summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseAllocation {
    pub lease_id: LeaseId,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub percentage: Decimal,
}

/// Tenant and owner shares of one utility type across a property's active leases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub property_id: PropertyId,
    pub utility_type: UtilityType,
    pub total_percentage: Decimal,
    pub owner_percentage: Decimal,
    pub is_valid: bool,
    pub is_complete: bool,
    pub leases: Vec<LeaseAllocation>,
}

/// A property whose tenant shares for a utility type are set but do not reach 100%
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompleteAllocation {
    pub property_id: PropertyId,
    pub property_name: String,
    pub utility_type: UtilityType,
    pub total_percentage: Decimal,
    pub owner_percentage: Decimal,
}

/// Parses a requested share into a `Percentage`, naming the offending input
pub fn parse_share(percentage: Decimal, subject: impl std::fmt::Display) -> Result<Percentage, AllocationError> {
    Percentage::new(percentage).map_err(|_| {
        AllocationError::validation(format!(
            "Percentage for {} must be between 0 and 100, got {}",
            subject, percentage
        ))
    })
}

/// Fails with `AllocationExceeded` when `total` is above 100
pub fn ensure_within_limit(utility_type: UtilityType, total: Decimal) -> Result<(), AllocationError> {
    if total > Decimal::ONE_HUNDRED {
        return Err(AllocationError::AllocationExceeded {
            utility_type,
            total: total.normalize(),
        });
    }
    Ok(())
}

/// Sum of `utility_type` shares held by the given leases
pub fn total_for<'a, I>(settings: I, utility_type: UtilityType, leases: &HashSet<LeaseId>) -> Decimal
where
    I: IntoIterator<Item = &'a AllocationSetting>,
{
    settings
        .into_iter()
        .filter(|s| s.utility_type == utility_type && leases.contains(&s.lease_id))
        .map(|s| s.percentage.value())
        .sum()
}
