//! Allocation handlers

use axum::{extract::State, Json};

use core_kernel::{LeaseId, Money, PropertyId};
use domain_allocation::{AllocationSetting, AllocationSummary, IncompleteAllocation, UtilityType};
use domain_billing::SplitPreview;

use crate::auth::CurrentUser;
use crate::dto::allocations::*;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, ValidJson};
use crate::AppState;

/// Replaces every lease's share of one utility on a property
pub async fn replace_property_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath((property_id, utility_type)): ApiPath<(PropertyId, UtilityType)>,
    ValidJson(request): ValidJson<ReplacePropertyAllocationsRequest>,
) -> Result<Json<Vec<AllocationSetting>>, ApiError> {
    let settings = state
        .allocations
        .replace_property_allocations(user, property_id, utility_type, request.shares)
        .await?;
    Ok(Json(settings))
}

/// Current split of one utility across a property's leases
pub async fn property_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath((property_id, utility_type)): ApiPath<(PropertyId, UtilityType)>,
) -> Result<Json<AllocationSummary>, ApiError> {
    let summary = state
        .allocations
        .property_summary(user, property_id, utility_type)
        .await?;
    Ok(Json(summary))
}

pub async fn lease_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(lease_id): ApiPath<LeaseId>,
) -> Result<Json<Vec<AllocationSetting>>, ApiError> {
    Ok(Json(state.allocations.lease_allocations(user, lease_id).await?))
}

/// Replaces all of one lease's settings
pub async fn set_lease_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(lease_id): ApiPath<LeaseId>,
    ValidJson(request): ValidJson<SetLeaseAllocationsRequest>,
) -> Result<Json<Vec<AllocationSetting>>, ApiError> {
    let settings = state
        .allocations
        .set_lease_allocations(user, lease_id, request.shares)
        .await?;
    Ok(Json(settings))
}

/// Copies another lease's settings onto this one
pub async fn copy_lease_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(lease_id): ApiPath<LeaseId>,
    ApiJson(request): ApiJson<CopyAllocationsRequest>,
) -> Result<Json<Vec<AllocationSetting>>, ApiError> {
    let settings = state
        .allocations
        .copy_lease_allocations(user, request.from_lease_id, lease_id)
        .await?;
    Ok(Json(settings))
}

pub async fn incomplete_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<IncompleteAllocation>>, ApiError> {
    Ok(Json(state.allocations.incomplete_allocations(user).await?))
}

/// What each lease would owe for a hypothetical bill
pub async fn split_preview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(property_id): ApiPath<PropertyId>,
    ApiQuery(query): ApiQuery<SplitPreviewQuery>,
) -> Result<Json<SplitPreview>, ApiError> {
    let total = Money::new(query.total_amount, state.currency);
    let preview = state
        .bills
        .preview_split(user, property_id, query.utility_type, total)
        .await?;
    Ok(Json(preview))
}
