//! Allocation DTOs

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use core_kernel::LeaseId;
use domain_allocation::{LeaseShare, UtilityShare, UtilityType};

#[derive(Debug, Deserialize, Validate)]
pub struct ReplacePropertyAllocationsRequest {
    #[validate(length(max = 200))]
    pub shares: Vec<LeaseShare>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetLeaseAllocationsRequest {
    #[validate(length(max = 20))]
    pub shares: Vec<UtilityShare>,
}

#[derive(Debug, Deserialize)]
pub struct CopyAllocationsRequest {
    pub from_lease_id: LeaseId,
}

#[derive(Debug, Deserialize)]
pub struct SplitPreviewQuery {
    pub utility_type: UtilityType,
    pub total_amount: Decimal,
}
