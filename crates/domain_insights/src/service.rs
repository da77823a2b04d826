//! Insights service
//!
//! Loads a caller's bills and tenancy data through the billing port and runs
//! the detectors over them. Nothing here writes to the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use core_kernel::{Clock, LeaseId, PropertyId, UserId};
use domain_allocation::{AllocationStoreExt, Property};
use domain_billing::{BillQuery, BillingStore, UtilityBill};

use crate::anomaly::{self, Severity, UtilityAnomaly};
use crate::config::{self, InsightsConfig};
use crate::delta::{self, MonthlyDelta};
use crate::error::InsightsError;
use crate::reminder::{self, MissingReadingReminder, OverdueBillReminder, RemindersReport};

/// Anomalies and deltas in one report, with headline counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub anomalies: Vec<UtilityAnomaly>,
    pub deltas: Vec<MonthlyDelta>,
    pub anomaly_count: usize,
    pub high_severity_count: usize,
}

/// Read-only reports over a landlord's utility history
pub struct InsightsService<S: BillingStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: InsightsConfig,
}

impl<S: BillingStore + ?Sized> Clone for InsightsService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: BillingStore + ?Sized> InsightsService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config: InsightsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InsightsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InsightsConfig {
        &self.config
    }

    /// The caller's properties, or just `property_id` once ownership is checked
    async fn scope(&self, user: UserId, property_id: Option<PropertyId>) -> Result<Vec<Property>, InsightsError> {
        match property_id {
            Some(id) => {
                let property = self.store.get_property(id).await?;
                if !property.is_owned_by(user) {
                    return Err(InsightsError::permission_denied(id));
                }
                Ok(vec![property])
            }
            None => Ok(self.store.properties_for_owner(user).await?),
        }
    }

    async fn load(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
    ) -> Result<(Vec<Property>, Vec<UtilityBill>), InsightsError> {
        let properties = self.scope(user, property_id).await?;
        let bills = self
            .store
            .find_bills(&BillQuery::for_owner(user).property(property_id))
            .await?;
        debug!(properties = properties.len(), bills = bills.len(), "Loaded insight inputs");
        Ok((properties, bills))
    }

    fn names(properties: &[Property]) -> HashMap<PropertyId, String> {
        properties.iter().map(|p| (p.id, p.name.clone())).collect()
    }

    /// Bills at least `threshold` percent above their trailing three-month average
    #[instrument(skip(self))]
    pub async fn detect_anomalies(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<UtilityAnomaly>, InsightsError> {
        let threshold = config::anomaly_threshold(threshold.unwrap_or(self.config.anomaly_threshold))?;
        let (properties, bills) = self.load(user, property_id).await?;
        let anomalies = anomaly::detect_anomalies(&bills, &Self::names(&properties), threshold);
        info!(count = anomalies.len(), %threshold, "Detected utility anomalies");
        Ok(anomalies)
    }

    /// Month-over-month changes across the most recent `months` billing months
    #[instrument(skip(self))]
    pub async fn monthly_deltas(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
        months: Option<u32>,
    ) -> Result<Vec<MonthlyDelta>, InsightsError> {
        let months = config::delta_months(months.unwrap_or(self.config.delta_months))?;
        let (properties, bills) = self.load(user, property_id).await?;
        Ok(delta::monthly_deltas(&bills, &Self::names(&properties), months))
    }

    /// Bills past due that the owner has not paid to the utility company
    #[instrument(skip(self))]
    pub async fn overdue_bills(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
        days_threshold: Option<i64>,
    ) -> Result<Vec<OverdueBillReminder>, InsightsError> {
        let min_days = config::overdue_days(days_threshold.unwrap_or(self.config.overdue_days_threshold))?;
        let (properties, bills) = self.load(user, property_id).await?;
        let today = self.clock.today();
        Ok(reminder::overdue_bills(&bills, &Self::names(&properties), today, min_days))
    }

    /// Expected bills that have not been entered
    ///
    /// Only utility types that some active lease carries a nonzero share of
    /// are expected.
    #[instrument(skip(self))]
    pub async fn missing_readings(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
        lookback_months: Option<u32>,
    ) -> Result<Vec<MissingReadingReminder>, InsightsError> {
        let lookback = config::lookback_months(lookback_months.unwrap_or(self.config.lookback_months))?;
        let (properties, bills) = self.load(user, property_id).await?;
        let today = self.clock.today();

        let mut reminders = Vec::new();
        for property in &properties {
            let active: HashSet<LeaseId> = self
                .store
                .active_leases(property.id)
                .await?
                .into_iter()
                .map(|l| l.id)
                .collect();
            if active.is_empty() {
                continue;
            }
            let expected_types: BTreeSet<_> = self
                .store
                .allocations_for_property(property.id)
                .await?
                .into_iter()
                .filter(|s| active.contains(&s.lease_id) && !s.percentage.is_zero())
                .map(|s| s.utility_type)
                .collect();
            if expected_types.is_empty() {
                continue;
            }
            reminders.extend(reminder::missing_readings(
                property,
                &expected_types,
                &bills,
                today,
                lookback,
                self.config.grace_days,
            ));
        }
        reminder::sort_missing(&mut reminders);
        Ok(reminders)
    }

    /// Overdue bills and missing readings with the configured defaults
    pub async fn all_reminders(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
    ) -> Result<RemindersReport, InsightsError> {
        let overdue = self.overdue_bills(user, property_id, None).await?;
        let missing = self.missing_readings(user, property_id, None).await?;
        Ok(RemindersReport::new(overdue, missing))
    }

    /// Anomalies and deltas with the configured defaults
    pub async fn insights_summary(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
    ) -> Result<InsightsSummary, InsightsError> {
        let anomalies = self.detect_anomalies(user, property_id, None).await?;
        let deltas = self.monthly_deltas(user, property_id, None).await?;
        let high_severity_count = anomalies.iter().filter(|a| a.severity == Severity::High).count();
        Ok(InsightsSummary {
            anomaly_count: anomalies.len(),
            high_severity_count,
            anomalies,
            deltas,
        })
    }
}
