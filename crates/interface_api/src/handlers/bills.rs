//! Bill handlers

use axum::{extract::State, http::StatusCode, Json};

use core_kernel::UtilityBillId;
use domain_billing::{
    BillFilter, BillWithCharges, BulkAddResult, MonthlyBillTotal, TenantUtilityCharge, UnpaidBill, UtilityBill,
};

use crate::auth::CurrentUser;
use crate::dto::bills::*;
use crate::dto::PropertyQuery;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, ValidJson};
use crate::AppState;

/// Records a bill and splits it across the property's leases
pub async fn create_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<CreateBillRequest>,
) -> Result<(StatusCode, Json<UtilityBill>), ApiError> {
    let new_bill = request.into_new_bill(state.currency, state.clock.today());
    let bill = state.bills.add_bill(user, new_bill).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// Records several bills for one property and month
///
/// Lines that fail are reported in the result; the rest are kept.
pub async fn bulk_create_bills(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<BulkAddBillsRequest>,
) -> Result<(StatusCode, Json<BulkAddResult>), ApiError> {
    let (property_id, billing_month, specs) = request.specs(state.currency, state.clock.today());
    let result = state
        .bills
        .bulk_add_bills(user, property_id, billing_month, specs)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list_bills(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(filter): ApiQuery<BillFilter>,
) -> Result<Json<Vec<UtilityBill>>, ApiError> {
    Ok(Json(state.bills.list_bills(user, filter).await?))
}

pub async fn get_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<UtilityBillId>,
) -> Result<Json<BillWithCharges>, ApiError> {
    Ok(Json(state.bills.get_bill_with_charges(user, id).await?))
}

/// Applies a partial update; amount changes re-split the bill
pub async fn update_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<UtilityBillId>,
    ValidJson(request): ValidJson<UpdateBillRequest>,
) -> Result<Json<UtilityBill>, ApiError> {
    let bill = state
        .bills
        .update_bill(user, id, request.into_update(state.currency))
        .await?;
    Ok(Json(bill))
}

pub async fn delete_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<UtilityBillId>,
) -> Result<StatusCode, ApiError> {
    state.bills.delete_bill(user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rebuilds a bill's charges from the current allocation settings
pub async fn regenerate_charges(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<UtilityBillId>,
) -> Result<Json<Vec<TenantUtilityCharge>>, ApiError> {
    Ok(Json(state.bills.regenerate_charges(user, id).await?))
}

/// Records whether the owner has paid the provider
pub async fn mark_owner_paid(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<UtilityBillId>,
    ApiJson(request): ApiJson<OwnerPaidRequest>,
) -> Result<Json<UtilityBill>, ApiError> {
    let bill = state
        .bills
        .mark_owner_paid(user, id, request.paid, request.paid_date)
        .await?;
    Ok(Json(bill))
}

pub async fn unpaid_bills(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PropertyQuery>,
) -> Result<Json<Vec<UnpaidBill>>, ApiError> {
    Ok(Json(state.bills.list_unpaid_bills(user, query.property_id).await?))
}

/// Monthly totals for a property between two billing months
pub async fn bills_by_month(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<MonthRangeQuery>,
) -> Result<Json<Vec<MonthlyBillTotal>>, ApiError> {
    let totals = state
        .bills
        .bills_by_month_range(user, query.property_id, query.start, query.end)
        .await?;
    Ok(Json(totals))
}
