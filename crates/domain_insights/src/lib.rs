//! Insights Domain - read-only analysis of a landlord's utility history
//!
//! This crate provides:
//! - Anomaly detection against a trailing three-month average
//! - Month-over-month deltas per property and utility type
//! - Overdue-bill and missing-reading reminders
//!
//! The detectors are pure functions over bill slices so they can be tested
//! without a store. `InsightsService` loads the data through the billing port,
//! checks ownership and applies the configured defaults.

pub mod error;
pub mod config;
pub mod anomaly;
pub mod delta;
pub mod reminder;
pub mod service;

pub use error::InsightsError;
pub use config::InsightsConfig;
pub use anomaly::{detect_anomalies, Severity, UtilityAnomaly};
pub use delta::{monthly_deltas, MonthlyDelta};
pub use reminder::{
    missing_readings, overdue_bills, MissingReadingReminder, OverdueBillReminder, RemindersReport,
};
pub use service::{InsightsService, InsightsSummary};

use std::collections::HashMap;

use core_kernel::PropertyId;
use rust_decimal::{Decimal, RoundingStrategy};

/// Name shown for a bill whose property no longer resolves
pub(crate) const UNKNOWN_PROPERTY: &str = "Unknown Property";

pub(crate) fn property_name(names: &HashMap<PropertyId, String>, id: PropertyId) -> String {
    names.get(&id).cloned().unwrap_or_else(|| UNKNOWN_PROPERTY.to_string())
}

/// Percentages in reports carry one decimal place, midpoints away from zero
pub(crate) fn one_decimal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}
