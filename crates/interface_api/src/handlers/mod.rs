//! Request handlers, one module per area of the API

pub mod health;
pub mod allocations;
pub mod bills;
pub mod payments;
pub mod statements;
pub mod insights;
