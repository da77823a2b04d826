//! Charge payment handlers

use axum::{extract::State, http::StatusCode, Json};

use core_kernel::ChargeId;
use domain_billing::{BatchResult, MarkPaidOutcome, PaymentReceipt, ReversalOutcome};

use crate::auth::CurrentUser;
use crate::dto::payments::*;
use crate::error::ApiError;
use crate::extract::{ApiPath, ValidJson};
use crate::AppState;

/// Records a payment against a charge
pub async fn record_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(charge_id): ApiPath<ChargeId>,
    ValidJson(request): ValidJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentReceipt>), ApiError> {
    let request = request.into_request(charge_id, state.clock.today());
    let receipt = state.ledger.record_payment(user, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Settles a charge in full, or reopens one that has no payments behind it
pub async fn mark_paid(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(charge_id): ApiPath<ChargeId>,
    ValidJson(request): ValidJson<MarkPaidRequest>,
) -> Result<Json<MarkPaidOutcome>, ApiError> {
    let outcome = state
        .ledger
        .mark_paid(user, charge_id, request.is_paid, request.notes)
        .await?;
    Ok(Json(outcome))
}

/// Books a reversing entry for everything paid on a charge
pub async fn reverse_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(charge_id): ApiPath<ChargeId>,
    ValidJson(request): ValidJson<ReversePaymentRequest>,
) -> Result<Json<ReversalOutcome>, ApiError> {
    let outcome = state
        .ledger
        .reverse_payment(user, charge_id, &request.reason)
        .await?;
    Ok(Json(outcome))
}

/// Marks many charges at once; per-charge failures are reported, not fatal
pub async fn bulk_mark_paid(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<BulkMarkPaidRequest>,
) -> Result<Json<BatchResult<MarkPaidOutcome>>, ApiError> {
    Ok(Json(
        state
            .ledger
            .mark_bulk_paid(user, request.charge_ids, request.is_paid)
            .await,
    ))
}

pub async fn bulk_payments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidJson(request): ValidJson<BulkPaymentsRequest>,
) -> Result<Json<BatchResult<PaymentReceipt>>, ApiError> {
    Ok(Json(state.ledger.apply_bulk_payments(user, request.payments).await))
}
