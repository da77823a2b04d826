//! Allocation Domain - who pays which share of a property's utilities
//!
//! This crate provides:
//! - Tenancy reference data (properties and leases) as read by the engine
//! - Utility types and per-lease responsibility settings
//! - The allocation manager, which keeps every property's tenant shares at
//!   or below 100% for each utility type

pub mod error;
pub mod tenancy;
pub mod utility;
pub mod setting;
pub mod ports;
pub mod manager;

pub use error::AllocationError;
pub use tenancy::{Lease, LeaseStatus, Property};
pub use utility::UtilityType;
pub use setting::{AllocationSetting, AllocationSummary, IncompleteAllocation, LeaseShare, UtilityShare};
pub use ports::{AllocationStore, AllocationStoreExt};
pub use manager::AllocationManager;
