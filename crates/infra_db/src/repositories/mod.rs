//! Repository implementations
//!
//! Repositories own the SQL. They speak in domain types on the way out and
//! raw UUIDs on the way in, and report failures as `DatabaseError`.
//!
//! # Architecture
//!
//! - Runtime-built queries, with `QueryBuilder` for optional filters
//! - One transaction per write that touches more than one row
//! - Derived paid state is written alongside the ledger entry that caused it

pub mod tenancy;
pub mod bills;
pub mod ledger;

pub use tenancy::TenancyRepository;
pub use bills::BillRepository;
pub use ledger::LedgerRepository;
