//! Utility Billing - API Server Binary
//!
//! This binary starts the HTTP API server for the utility billing engine.
//!
//! # Usage
//!
//! ```bash
//! # Run on the in-memory store
//! cargo run --bin utility-billing-api
//!
//! # Run against PostgreSQL
//! API__DATABASE_URL=postgres://... API__JWT_SECRET=... cargo run --bin utility-billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API__HOST`, `API__PORT` - Bind address (default: 0.0.0.0:8080)
//! * `API__DATABASE_URL` - PostgreSQL connection string; omit for the in-memory store
//! * `API__DATABASE_MIGRATE=false` - Skip the embedded migrations at startup
//! * `API__JWT_SECRET` - JWT signing secret (required in production)
//! * `API__TIMEZONE` - IANA zone for due dates and reminders (default: UTC)
//! * `RUST_LOG` - Log filter (default: `interface_api=debug,tower_http=debug`)
//! * `API_LOG_FORMAT=json` - Emit JSON log lines

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{Clock, SystemClock};
use domain_billing::{BillingStore, InMemoryStore};
use infra_db::{create_pool, DatabaseConfig, PostgresStore};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    init_tracing();

    let config = ApiConfig::load().context("loading configuration")?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        timezone = %config.timezone,
        currency = %config.currency,
        "Starting utility billing API server"
    );

    let store = build_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.clock_timezone()?));

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;
    let eviction_interval = config.rate_limit_eviction_interval();

    let state = AppState::new(store, clock, config)?;
    spawn_rate_limit_eviction(&state, eviction_interval);

    let app = create_router(state);

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("interface_api=debug,tower_http=debug"));

    let json = std::env::var("API_LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

/// PostgreSQL when a URL is configured, otherwise an empty in-memory store
async fn build_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn BillingStore>> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let mut db_config =
                DatabaseConfig::new(url.as_str()).max_connections(config.database_max_connections);
            if !config.database_migrate {
                db_config = db_config.without_migrations();
            }
            let pool = create_pool(db_config)
                .await
                .context("connecting to database")?;
            tracing::info!("Database ready");
            Ok(Arc::new(PostgresStore::new(pool)))
        }
        None => {
            tracing::warn!("No database_url configured, using the in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn spawn_rate_limit_eviction(state: &AppState, every: std::time::Duration) {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "Dropped expired rate limit windows");
            }
        }
    });
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed that signal is ignored and the other
/// one still triggers shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
