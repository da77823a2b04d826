//! Balance and statement handlers

use axum::{extract::State, Json};

use core_kernel::{DateRange, LeaseId};
use domain_billing::{
    BillingError, ChargesSummary, LeaseBalance, PaymentRecord, PaymentSummary, TenantOutstanding, TenantStatement,
};

use crate::auth::CurrentUser;
use crate::dto::payments::{PaymentHistoryQuery, ReportQuery, StatementQuery};
use crate::dto::PropertyQuery;
use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};
use crate::AppState;

fn period(start: chrono::NaiveDate, end: chrono::NaiveDate) -> Result<DateRange, ApiError> {
    DateRange::new(start, end).map_err(|e| BillingError::from(e).into())
}

/// Unpaid charges grouped by tenant
pub async fn outstanding_charges(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Json<Vec<TenantOutstanding>>, ApiError> {
    Ok(Json(state.statements.outstanding_charges(user, query.into()).await?))
}

pub async fn charges_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PropertyQuery>,
) -> Result<Json<ChargesSummary>, ApiError> {
    Ok(Json(state.statements.charges_summary(user, query.property_id).await?))
}

pub async fn lease_balance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(lease_id): ApiPath<LeaseId>,
) -> Result<Json<LeaseBalance>, ApiError> {
    Ok(Json(state.statements.balance_for_lease(user, lease_id).await?))
}

/// Charges and payments for one lease over a date range
pub async fn tenant_statement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiPath(lease_id): ApiPath<LeaseId>,
    ApiQuery(query): ApiQuery<StatementQuery>,
) -> Result<Json<TenantStatement>, ApiError> {
    let range = period(query.start, query.end)?;
    Ok(Json(state.statements.tenant_statement(user, lease_id, range).await?))
}

/// Ledger entries, optionally limited to a date range
///
/// `start` and `end` must be given together.
pub async fn payment_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PaymentHistoryQuery>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let range = match (query.start, query.end) {
        (Some(start), Some(end)) => Some(period(start, end)?),
        (None, None) => None,
        _ => return Err(ApiError::bad_request("start and end must be given together")),
    };
    let filter = ReportQuery {
        property_id: query.property_id,
        lease_id: query.lease_id,
    };
    Ok(Json(state.statements.payment_history(user, filter.into(), range).await?))
}

pub async fn payment_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Json<PaymentSummary>, ApiError> {
    Ok(Json(state.statements.payment_summary(user, query.into()).await?))
}
