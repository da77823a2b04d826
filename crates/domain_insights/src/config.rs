//! Default thresholds for the insight detectors
//!
//! Every service operation accepts a per-call override; `None` falls back to
//! the value configured here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::InsightsError;

/// Detector thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    /// Minimum increase over the trailing average, in percent, to flag a bill
    pub anomaly_threshold: Decimal,
    /// How many of the most recent billing months the delta report covers
    pub delta_months: u32,
    /// Minimum days past due before a bill is reported overdue
    pub overdue_days_threshold: i64,
    /// How many calendar months back, counting the current one, to look for missing bills
    pub lookback_months: u32,
    /// Days after the first of a month before its bill is expected
    pub grace_days: i64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: dec!(30),
            delta_months: 6,
            overdue_days_threshold: 1,
            lookback_months: 2,
            grace_days: 35,
        }
    }
}

impl InsightsConfig {
    pub fn with_anomaly_threshold(mut self, threshold: Decimal) -> Self {
        self.anomaly_threshold = threshold;
        self
    }

    pub fn with_delta_months(mut self, months: u32) -> Self {
        self.delta_months = months;
        self
    }

    pub fn with_overdue_days_threshold(mut self, days: i64) -> Self {
        self.overdue_days_threshold = days;
        self
    }

    pub fn with_lookback_months(mut self, months: u32) -> Self {
        self.lookback_months = months;
        self
    }

    pub fn with_grace_days(mut self, days: i64) -> Self {
        self.grace_days = days;
        self
    }

    /// Rejects thresholds that would make a detector meaningless
    pub fn validate(&self) -> Result<(), InsightsError> {
        anomaly_threshold(self.anomaly_threshold)?;
        delta_months(self.delta_months)?;
        overdue_days(self.overdue_days_threshold)?;
        lookback_months(self.lookback_months)?;
        if self.grace_days < 0 {
            return Err(InsightsError::validation("Grace days cannot be negative"));
        }
        Ok(())
    }
}

pub(crate) fn anomaly_threshold(threshold: Decimal) -> Result<Decimal, InsightsError> {
    if threshold <= Decimal::ZERO {
        return Err(InsightsError::validation("Anomaly threshold must be greater than 0"));
    }
    Ok(threshold)
}

pub(crate) fn delta_months(months: u32) -> Result<u32, InsightsError> {
    if months < 2 {
        return Err(InsightsError::validation("Delta report needs at least 2 months"));
    }
    Ok(months)
}

pub(crate) fn overdue_days(days: i64) -> Result<i64, InsightsError> {
    if days < 0 {
        return Err(InsightsError::validation("Days overdue threshold cannot be negative"));
    }
    Ok(days)
}

pub(crate) fn lookback_months(months: u32) -> Result<u32, InsightsError> {
    if !(1..=24).contains(&months) {
        return Err(InsightsError::validation("Lookback must be between 1 and 24 months"));
    }
    Ok(months)
}
