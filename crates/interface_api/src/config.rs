//! API configuration
//!
//! Layered with the `config` crate: built-in defaults, then
//! `config/default.toml` and `config/{RUN_ENV}.toml` if present, then
//! `API__*` environment variables (`API__PORT=9000`,
//! `API__INSIGHTS__ANOMALY_THRESHOLD=40`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::{Currency, Timezone};
use domain_insights::InsightsConfig;

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL URL; without one the server runs on the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Apply the embedded migrations at startup
    pub database_migrate: bool,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT lifetime in hours
    pub jwt_expiration_hours: i64,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
    /// IANA zone that decides what "today" is for due dates and reminders
    pub timezone: String,
    /// ISO code of the currency bills are entered in
    pub currency: String,
    /// Mutations allowed per user and kind within one window
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    /// How often expired rate-limit windows are dropped
    pub rate_limit_eviction_secs: u64,
    /// Default thresholds for the insight reports
    pub insights: InsightsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            database_max_connections: 10,
            database_migrate: true,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_hours: 24,
            cors_origins: Vec::new(),
            timezone: "UTC".to_string(),
            currency: "USD".to_string(),
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            rate_limit_eviction_secs: 300,
            insights: InsightsConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from files and environment, then validates it
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());

        let loaded: ApiConfig = config::Config::builder()
            .add_source(config::Config::try_from(&ApiConfig::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_env)).required(false))
            .add_source(
                config::Environment::with_prefix("API")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks values the type system cannot
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.clock_timezone()?;
        self.billing_currency()?;
        if self.rate_limit_max_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(config::ConfigError::Message(
                "rate limit requests and window must be greater than 0".to_string(),
            ));
        }
        if self.database_max_connections == 0 {
            return Err(config::ConfigError::Message(
                "database_max_connections must be greater than 0".to_string(),
            ));
        }
        if self.jwt_expiration_hours <= 0 {
            return Err(config::ConfigError::Message(
                "jwt_expiration_hours must be greater than 0".to_string(),
            ));
        }
        self.insights
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn clock_timezone(&self) -> Result<Timezone, config::ConfigError> {
        self.timezone
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("timezone: {}", e)))
    }

    pub fn billing_currency(&self) -> Result<Currency, config::ConfigError> {
        self.currency
            .parse()
            .map_err(|e| config::ConfigError::Message(format!("currency: {}", e)))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn rate_limit_eviction_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_eviction_secs.max(1))
    }
}
