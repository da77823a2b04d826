//! API error handling
//!
//! Every domain error carries an `ErrorKind`; this module is the one place
//! that turns a kind into an HTTP status.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use domain_allocation::AllocationError;
use domain_billing::{BillingError, ErrorKind};
use domain_insights::InsightsError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// A domain operation failed
    #[error("{message}")]
    Domain {
        kind: ErrorKind,
        message: String,
        details: Option<Value>,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain { kind, .. } => status_for(*kind),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> String {
        match self {
            ApiError::Domain { kind, .. } => serde_json::to_value(kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "error".to_string()),
            ApiError::BadRequest(_) => "bad_request".to_string(),
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::RateLimited { .. } => "rate_limited".to_string(),
            ApiError::Internal(_) => "internal_error".to_string(),
        }
    }
}

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Duplicate | ErrorKind::Conflict | ErrorKind::NotPaid => StatusCode::CONFLICT,
        ErrorKind::AllocationExceeded | ErrorKind::Overpayment => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Store failures keep their detail in the log only
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let (details, retry_after) = match self {
            ApiError::Domain { details, .. } => (details, None),
            ApiError::RateLimited { retry_after_secs } => {
                (Some(json!({ "retry_after_secs": retry_after_secs })), Some(retry_after_secs))
            }
            _ => (None, None),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message, details },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let details = match &err {
            BillingError::Overpayment { remaining } => Some(json!({ "remaining_balance": remaining })),
            BillingError::AllocationExceeded { utility_type, total } => {
                Some(json!({ "utility_type": utility_type, "total_percentage": total }))
            }
            _ => None,
        };
        ApiError::Domain {
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        BillingError::from(err).into()
    }
}

impl From<InsightsError> for ApiError {
    fn from(err: InsightsError) -> Self {
        ApiError::Domain {
            kind: err.kind(),
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Domain {
            kind: ErrorKind::Validation,
            message: "Request validation failed".to_string(),
            details: serde_json::to_value(&errors).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Duplicate), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::AllocationExceeded), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::Permission), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::Storage), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_overpayment_carries_remaining_balance() {
        let err: ApiError = BillingError::Overpayment {
            remaining: Money::new(dec!(80), Currency::USD),
        }
        .into();
        match &err {
            ApiError::Domain { kind, details, .. } => {
                assert_eq!(*kind, ErrorKind::Overpayment);
                assert!(details.as_ref().unwrap().get("remaining_balance").is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.code(), "overpayment");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
