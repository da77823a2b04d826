//! Store ports shared by the domain crates
//!
//! # Usage
//!
//! Each domain defines its own store trait extending `DomainPort`. The
//! in-memory adapter and the PostgreSQL adapter both implement it, and
//! services only ever see the trait.
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait BillingStore: AllocationStore {
//!     async fn get_bill(&self, id: UtilityBillId) -> Result<UtilityBill, PortError>;
//! }
//! ```

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Failure reported by a store adapter
///
/// Domain errors are built from this, so a service never matches on `sqlx`
/// or in-memory details.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// Rejected by a data constraint rather than by the domain rules
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// Unique key collision, or a row still referenced by another
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Connection loss and pool timeouts may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Timeout { .. })
    }

    /// Returns true if the write was rejected because of existing data
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Supertrait of every store port: shareable across request tasks
pub trait DomainPort: Send + Sync + 'static {}

/// Readiness of a store adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Answering, but slower than the readiness threshold
    Degraded,
    Unhealthy,
    Unknown,
}

/// Outcome of one readiness probe, returned by `/health/ready`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// `"postgres"` or `"memory"`
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Store adapters that can answer a readiness probe
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

impl HealthCheckResult {
    /// Builds a result stamped with the current time
    pub fn new(adapter_id: impl Into<String>, status: AdapterHealth, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
