//! Request and query types
//!
//! Amounts arrive as plain decimals and are tagged with the configured
//! currency in the handlers. Responses are the domain types themselves.

pub mod allocations;
pub mod bills;
pub mod payments;
pub mod insights;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::borrow::Cow;
use validator::ValidationError;

use core_kernel::{Currency, PropertyId};

/// Rejects amounts finer than a cent instead of rounding them away
pub(crate) fn whole_cents(amount: &Decimal) -> Result<(), ValidationError> {
    if Currency::USD.fits_minor_units(*amount) {
        return Ok(());
    }
    let mut error = ValidationError::new("whole_cents");
    error.message = Some(Cow::from("Amount cannot have more than 2 decimal places"));
    Err(error)
}

/// Optional property narrowing shared by several reports
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PropertyQuery {
    pub property_id: Option<PropertyId>,
}
