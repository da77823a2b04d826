//! Insight handlers

use axum::{extract::State, Json};

use domain_insights::{
    InsightsSummary, MissingReadingReminder, MonthlyDelta, OverdueBillReminder, RemindersReport, UtilityAnomaly,
};

use crate::auth::CurrentUser;
use crate::dto::insights::*;
use crate::dto::PropertyQuery;
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::AppState;

pub async fn anomalies(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<AnomalyQuery>,
) -> Result<Json<Vec<UtilityAnomaly>>, ApiError> {
    let found = state
        .insights
        .detect_anomalies(user, query.property_id, query.threshold)
        .await?;
    Ok(Json(found))
}

pub async fn monthly_deltas(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<DeltaQuery>,
) -> Result<Json<Vec<MonthlyDelta>>, ApiError> {
    let deltas = state
        .insights
        .monthly_deltas(user, query.property_id, query.months)
        .await?;
    Ok(Json(deltas))
}

pub async fn overdue_bills(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<OverdueQuery>,
) -> Result<Json<Vec<OverdueBillReminder>>, ApiError> {
    let overdue = state
        .insights
        .overdue_bills(user, query.property_id, query.days_threshold)
        .await?;
    Ok(Json(overdue))
}

pub async fn missing_readings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<MissingReadingsQuery>,
) -> Result<Json<Vec<MissingReadingReminder>>, ApiError> {
    let missing = state
        .insights
        .missing_readings(user, query.property_id, query.lookback_months)
        .await?;
    Ok(Json(missing))
}

/// Overdue bills and missing readings together, using configured defaults
pub async fn reminders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PropertyQuery>,
) -> Result<Json<RemindersReport>, ApiError> {
    Ok(Json(state.insights.all_reminders(user, query.property_id).await?))
}

pub async fn summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<PropertyQuery>,
) -> Result<Json<InsightsSummary>, ApiError> {
    Ok(Json(state.insights.insights_summary(user, query.property_id).await?))
}
