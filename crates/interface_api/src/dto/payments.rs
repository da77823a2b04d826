//! Charge and payment DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use core_kernel::{ChargeId, LeaseId, PropertyId};
use domain_billing::{PaymentMethod, PaymentRequest, ReportFilter};

use super::whole_cents;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "whole_cents"))]
    pub amount: Decimal,
    /// Defaults to today
    pub payment_date: Option<NaiveDate>,
    pub method: PaymentMethod,
    #[validate(length(max = 200))]
    pub reference: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl RecordPaymentRequest {
    pub fn into_request(self, charge_id: ChargeId, today: NaiveDate) -> PaymentRequest {
        PaymentRequest {
            charge_id,
            amount: self.amount,
            payment_date: self.payment_date.unwrap_or(today),
            method: self.method,
            reference: self.reference,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkPaidRequest {
    pub is_paid: bool,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReversePaymentRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkMarkPaidRequest {
    #[validate(length(min = 1, max = 500))]
    pub charge_ids: Vec<ChargeId>,
    pub is_paid: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkPaymentsRequest {
    #[validate(length(min = 1, max = 500))]
    pub payments: Vec<PaymentRequest>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReportQuery {
    pub property_id: Option<PropertyId>,
    pub lease_id: Option<LeaseId>,
}

impl From<ReportQuery> for ReportFilter {
    fn from(query: ReportQuery) -> Self {
        ReportFilter {
            property_id: query.property_id,
            lease_id: query.lease_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaymentHistoryQuery {
    pub property_id: Option<PropertyId>,
    pub lease_id: Option<LeaseId>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatementQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}
