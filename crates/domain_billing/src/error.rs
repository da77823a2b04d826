//! Billing domain errors

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{BillingMonth, ChargeId, Money, MoneyError, PortError, TemporalError, UtilityBillId};
use domain_allocation::{AllocationError, UtilityType};

/// Machine-readable category of a billing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Duplicate,
    AllocationExceeded,
    Overpayment,
    NotPaid,
    NotFound,
    Permission,
    Conflict,
    Storage,
}

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Malformed or out-of-range input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// A bill already exists for the property, utility type and month
    #[error("A {utility_type} bill for {billing_month} already exists")]
    DuplicateBill {
        utility_type: UtilityType,
        billing_month: BillingMonth,
    },

    /// Tenant shares for the bill's utility type total more than 100%
    #[error("Utility percentages for {utility_type} sum to {total}%, which exceeds 100%")]
    AllocationExceeded {
        utility_type: UtilityType,
        total: Decimal,
    },

    /// Payment would take the charge past its charged amount
    #[error("Payment amount cannot exceed remaining balance of {remaining}")]
    Overpayment {
        remaining: Money,
    },

    /// Reversal requested on a charge that is not paid
    #[error("Charge {0} is not marked as paid")]
    NotPaid(ChargeId),

    /// Charges cannot be rebuilt or removed while ledger entries reference them
    #[error("Bill {bill_id} has {entries} ledger entries or paid charges; reverse them before changing its charges")]
    RecomputeBlocked {
        bill_id: UtilityBillId,
        entries: usize,
    },

    /// Referenced bill, charge, lease or property does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Caller does not own the record
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Money arithmetic failed
    #[error("Financial error: {0}")]
    Money(#[from] MoneyError),

    /// Underlying store failed
    #[error("Store error: {0}")]
    Store(PortError),
}

impl BillingError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    /// Creates a not found error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a permission error for a record the caller does not own
    pub fn permission_denied(what: impl std::fmt::Display) -> Self {
        BillingError::PermissionDenied(format!("caller does not own {}", what))
    }

    /// Returns the category callers branch on
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::Validation(_) | BillingError::Money(_) => ErrorKind::Validation,
            BillingError::DuplicateBill { .. } => ErrorKind::Duplicate,
            BillingError::AllocationExceeded { .. } => ErrorKind::AllocationExceeded,
            BillingError::Overpayment { .. } => ErrorKind::Overpayment,
            BillingError::NotPaid(_) => ErrorKind::NotPaid,
            BillingError::RecomputeBlocked { .. } => ErrorKind::Conflict,
            BillingError::NotFound { .. } => ErrorKind::NotFound,
            BillingError::PermissionDenied(_) => ErrorKind::Permission,
            BillingError::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            BillingError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Remaining balance carried by an overpayment rejection
    pub fn remaining_balance(&self) -> Option<Money> {
        match self {
            BillingError::Overpayment { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

impl From<PortError> for BillingError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, .. } => BillingError::Validation(message),
            other => BillingError::Store(other),
        }
    }
}

impl From<AllocationError> for BillingError {
    fn from(error: AllocationError) -> Self {
        match error {
            AllocationError::Validation(message) => BillingError::Validation(message),
            AllocationError::AllocationExceeded { utility_type, total } => {
                BillingError::AllocationExceeded { utility_type, total }
            }
            AllocationError::NotFound { entity, id } => BillingError::NotFound { entity, id },
            AllocationError::PermissionDenied(message) => BillingError::PermissionDenied(message),
            AllocationError::Store(e) => BillingError::Store(e),
        }
    }
}

impl From<TemporalError> for BillingError {
    fn from(error: TemporalError) -> Self {
        BillingError::Validation(error.to_string())
    }
}
