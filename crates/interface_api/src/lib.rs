//! HTTP API Layer
//!
//! This crate provides the REST API for the utility billing engine using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for allocations, bills, payments, statements and insights
//! - **Middleware**: Authentication, rate limiting, tracing, audit logging
//! - **DTOs**: Request bodies and query strings
//! - **Error Handling**: One JSON error shape, status chosen by error kind
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(store, clock, config)?;
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;
pub mod extract;
pub mod rate_limit;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use core_kernel::{Clock, Currency};
use domain_allocation::AllocationManager;
use domain_billing::{BillService, BillingStore, PaymentLedger, StatementService};
use domain_insights::InsightsService;

use crate::config::ApiConfig;
use crate::handlers::{allocations, bills, health, insights, payments, statements};
use crate::middleware::{audit_middleware, auth_middleware};
use crate::rate_limit::{rate_limit_middleware, FixedWindowRateLimiter, RateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub allocations: AllocationManager<dyn BillingStore>,
    pub bills: BillService<dyn BillingStore>,
    pub ledger: PaymentLedger<dyn BillingStore>,
    pub statements: StatementService<dyn BillingStore>,
    pub insights: InsightsService<dyn BillingStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub clock: Arc<dyn Clock>,
    pub currency: Currency,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    /// Wires the domain services over one store
    pub fn new(
        store: Arc<dyn BillingStore>,
        clock: Arc<dyn Clock>,
        config: ApiConfig,
    ) -> Result<Self, ::config::ConfigError> {
        let currency = config.billing_currency()?;
        let rate_limiter = Arc::new(FixedWindowRateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window(),
        ));

        Ok(Self {
            allocations: AllocationManager::new(store.clone()),
            bills: BillService::new(store.clone(), clock.clone()).with_currency(currency),
            ledger: PaymentLedger::new(store.clone(), clock.clone()),
            statements: StatementService::new(store.clone(), clock.clone()).with_currency(currency),
            insights: InsightsService::new(store.clone(), clock.clone()).with_config(config.insights.clone()),
            store,
            rate_limiter,
            clock,
            currency,
            config: Arc::new(config),
        })
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Creates the main API router
///
/// Everything under `/api/v1` requires a bearer token. Mutations are also
/// rate limited per caller.
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let allocation_routes = Router::new()
        .route(
            "/properties/:property_id/allocations/:utility_type",
            get(allocations::property_summary).put(allocations::replace_property_allocations),
        )
        .route("/properties/:property_id/split-preview", get(allocations::split_preview))
        .route(
            "/leases/:lease_id/allocations",
            get(allocations::lease_allocations).put(allocations::set_lease_allocations),
        )
        .route("/leases/:lease_id/allocations/copy", post(allocations::copy_lease_allocations))
        .route("/allocations/incomplete", get(allocations::incomplete_allocations));

    let bill_routes = Router::new()
        .route("/bills", get(bills::list_bills).post(bills::create_bill))
        .route("/bills/bulk", post(bills::bulk_create_bills))
        .route("/bills/unpaid", get(bills::unpaid_bills))
        .route("/bills/by-month", get(bills::bills_by_month))
        .route(
            "/bills/:id",
            get(bills::get_bill).patch(bills::update_bill).delete(bills::delete_bill),
        )
        .route("/bills/:id/regenerate-charges", post(bills::regenerate_charges))
        .route("/bills/:id/owner-paid", put(bills::mark_owner_paid));

    let payment_routes = Router::new()
        .route("/charges/outstanding", get(statements::outstanding_charges))
        .route("/charges/summary", get(statements::charges_summary))
        .route("/charges/bulk/mark-paid", post(payments::bulk_mark_paid))
        .route("/charges/:id/payments", post(payments::record_payment))
        .route("/charges/:id/paid", put(payments::mark_paid))
        .route("/charges/:id/reverse", post(payments::reverse_payment))
        .route("/payments", get(statements::payment_history))
        .route("/payments/bulk", post(payments::bulk_payments))
        .route("/payments/summary", get(statements::payment_summary))
        .route("/leases/:lease_id/balance", get(statements::lease_balance))
        .route("/leases/:lease_id/statement", get(statements::tenant_statement));

    let insight_routes = Router::new()
        .route("/insights/anomalies", get(insights::anomalies))
        .route("/insights/deltas", get(insights::monthly_deltas))
        .route("/insights/overdue", get(insights::overdue_bills))
        .route("/insights/missing-readings", get(insights::missing_readings))
        .route("/insights/reminders", get(insights::reminders))
        .route("/insights/summary", get(insights::summary));

    // Protected API routes; the last layer added runs first
    let api_routes = Router::new()
        .merge(allocation_routes)
        .merge(bill_routes)
        .merge(payment_routes)
        .merge(insight_routes)
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        // Equivalent to ServiceBuilder ordering: CORS outermost, then tracing
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
