//! Core Kernel - Foundational types shared by the utility billing crates
//!
//! This crate provides the building blocks used across all domain modules:
//! - Money and percentage types with precise decimal arithmetic
//! - Billing months, date ranges and an injectable clock
//! - Strongly-typed identifiers
//! - Ports infrastructure shared by every store adapter

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError, Percentage};
pub use temporal::{
    BillingMonth, Clock, DateRange, FixedClock, SystemClock, TemporalError, Timezone,
};
pub use identifiers::{
    UserId, PropertyId, UnitId, LeaseId, AllocationId,
    UtilityBillId, ChargeId, PaymentId, DocumentId,
};
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
