//! Allocation domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::PortError;
use crate::utility::UtilityType;

/// Errors that can occur while reading or changing responsibility splits
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Input rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tenant shares for one utility type would total more than 100%
    #[error("Utility percentages for {utility_type} sum to {total}%, which exceeds 100%")]
    AllocationExceeded {
        utility_type: UtilityType,
        total: Decimal,
    },

    /// Referenced property or lease does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Caller does not own the record
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Underlying store failed
    #[error("Store error: {0}")]
    Store(PortError),
}

impl AllocationError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        AllocationError::Validation(message.into())
    }

    /// Creates a not found error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        AllocationError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a permission error for a record the caller does not own
    pub fn permission_denied(what: impl std::fmt::Display) -> Self {
        AllocationError::PermissionDenied(format!("caller does not own {}", what))
    }
}

impl From<PortError> for AllocationError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => AllocationError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Validation { message, .. } => AllocationError::Validation(message),
            other => AllocationError::Store(other),
        }
    }
}
