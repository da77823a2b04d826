//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! utility billing test suite.
//!
//! # Modules
//!
//! - `fixtures`: A seeded landlord with a property, leases and a fixed clock
//! - `builders`: Builder patterns for properties and bills
//! - `database`: PostgreSQL test containers
//! - `assertions`: Custom assertion helpers for money and charges
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
