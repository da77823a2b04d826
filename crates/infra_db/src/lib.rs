//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the utility billing engine, using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. Repositories own the SQL and
//! the row types; `adapters::PostgresStore` implements the domain store
//! ports on top of them, so services never see a `sqlx` type.
//!
//! # Schema
//!
//! Migrations live in the workspace `migrations/` directory and are embedded
//! at build time. `create_pool` applies them unless told otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{adapters::PostgresStore, create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/utility_billing")).await?;
//! let store = PostgresStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod rows;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::PostgresStore;
