//! Insights domain errors

use thiserror::Error;

use core_kernel::PortError;
use domain_billing::ErrorKind;

/// Errors raised while building an insight report
#[derive(Debug, Error)]
pub enum InsightsError {
    /// A per-call override was out of range
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store error: {0}")]
    Store(PortError),
}

impl InsightsError {
    pub fn validation(message: impl Into<String>) -> Self {
        InsightsError::Validation(message.into())
    }

    pub fn permission_denied(what: impl std::fmt::Display) -> Self {
        InsightsError::PermissionDenied(format!("caller does not own {}", what))
    }

    /// Same categories the billing errors use, so callers map both alike
    pub fn kind(&self) -> ErrorKind {
        match self {
            InsightsError::Validation(_) => ErrorKind::Validation,
            InsightsError::NotFound { .. } => ErrorKind::NotFound,
            InsightsError::PermissionDenied(_) => ErrorKind::Permission,
            InsightsError::Store(_) => ErrorKind::Storage,
        }
    }
}

impl From<PortError> for InsightsError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => InsightsError::NotFound {
                entity: entity_type,
                id,
            },
            other => InsightsError::Store(other),
        }
    }
}
