//! Domain Adapters
//!
//! Implementations of the domain store ports on top of the repositories.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresStore;
//! use domain_billing::BillingStore;
//!
//! let store = PostgresStore::new(pool);
//! let bill = store.get_bill(bill_id).await?;
//! ```

pub mod store;

pub use store::PostgresStore;
