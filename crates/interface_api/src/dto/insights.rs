//! Insight query parameters; an absent value uses the configured default

use rust_decimal::Decimal;
use serde::Deserialize;

use core_kernel::PropertyId;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnomalyQuery {
    pub property_id: Option<PropertyId>,
    pub threshold: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DeltaQuery {
    pub property_id: Option<PropertyId>,
    pub months: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OverdueQuery {
    pub property_id: Option<PropertyId>,
    pub days_threshold: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MissingReadingsQuery {
    pub property_id: Option<PropertyId>,
    pub lookback_months: Option<u32>,
}
