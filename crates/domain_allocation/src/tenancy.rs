//! Tenancy reference data
//!
//! Properties and leases are owned by the surrounding property-management
//! system. The engine only reads them to decide who is charged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{LeaseId, PropertyId, UnitId, UserId};
use crate::error::AllocationError;

/// A rental property belonging to one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub owner_id: UserId,
    pub name: String,
    pub address: Option<String>,
}

impl Property {
    pub fn new(owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: PropertyId::new_v7(),
            owner_id,
            name: name.into(),
            address: None,
        }
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_id == user
    }
}

/// Lease lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Pending,
    Active,
    Expired,
    Terminated,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Pending => "pending",
            LeaseStatus::Active => "active",
            LeaseStatus::Expired => "expired",
            LeaseStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseStatus {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeaseStatus::Pending),
            "active" => Ok(LeaseStatus::Active),
            "expired" => Ok(LeaseStatus::Expired),
            "terminated" => Ok(LeaseStatus::Terminated),
            other => Err(AllocationError::validation(format!("Unknown lease status: {}", other))),
        }
    }
}

/// A tenant's lease on a property, optionally tied to a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub property_id: PropertyId,
    pub unit_id: Option<UnitId>,
    pub unit_label: Option<String>,
    pub tenant_name: String,
    pub status: LeaseStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl Lease {
    /// Creates an active lease starting on `start_date`
    pub fn new(property_id: PropertyId, tenant_name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: LeaseId::new_v7(),
            property_id,
            unit_id: None,
            unit_label: None,
            tenant_name: tenant_name.into(),
            status: LeaseStatus::Active,
            start_date,
            end_date: None,
        }
    }

    pub fn with_unit(mut self, unit_id: UnitId, label: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id);
        self.unit_label = Some(label.into());
        self
    }

    pub fn with_status(mut self, status: LeaseStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == LeaseStatus::Active
    }

    /// Sort key used by every tenant listing: unit label first, then tenant name
    pub fn display_key(&self) -> (String, String) {
        (
            self.unit_label.clone().unwrap_or_default(),
            self.tenant_name.clone(),
        )
    }
}
