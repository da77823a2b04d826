//! Bill DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{BillingMonth, Currency, DocumentId, Money, PropertyId};
use domain_allocation::UtilityType;
use domain_billing::{BillUpdate, BulkBillSpec, NewBill};

use super::whole_cents;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBillRequest {
    pub property_id: PropertyId,
    pub utility_type: UtilityType,
    #[validate(length(min = 1, max = 200))]
    pub provider: String,
    pub billing_month: BillingMonth,
    #[validate(custom(function = "whole_cents"))]
    pub total_amount: Decimal,
    pub due_date: NaiveDate,
    /// Defaults to today
    pub bill_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub document_id: Option<DocumentId>,
}

impl CreateBillRequest {
    pub fn into_new_bill(self, currency: Currency, today: NaiveDate) -> NewBill {
        NewBill {
            property_id: self.property_id,
            utility_type: self.utility_type,
            provider: self.provider,
            billing_month: self.billing_month,
            total_amount: Money::new(self.total_amount, currency),
            due_date: self.due_date,
            bill_date: self.bill_date.unwrap_or(today),
            notes: self.notes,
            document_id: self.document_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBillRequest {
    #[validate(length(min = 1, max = 200))]
    pub provider: Option<String>,
    pub billing_month: Option<BillingMonth>,
    #[validate(custom(function = "whole_cents"))]
    pub total_amount: Option<Decimal>,
    pub bill_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub document_id: Option<DocumentId>,
    pub owner_paid: Option<bool>,
    pub owner_paid_date: Option<NaiveDate>,
}

impl UpdateBillRequest {
    pub fn into_update(self, currency: Currency) -> BillUpdate {
        BillUpdate {
            provider: self.provider,
            billing_month: self.billing_month,
            total_amount: self.total_amount.map(|amount| Money::new(amount, currency)),
            bill_date: self.bill_date,
            due_date: self.due_date,
            notes: self.notes,
            document_id: self.document_id,
            owner_paid: self.owner_paid,
            owner_paid_date: self.owner_paid_date,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BulkBillLine {
    pub utility_type: UtilityType,
    #[validate(length(min = 1, max = 200))]
    pub provider: String,
    #[validate(custom(function = "whole_cents"))]
    pub total_amount: Decimal,
    pub due_date: NaiveDate,
    pub bill_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkAddBillsRequest {
    pub property_id: PropertyId,
    pub billing_month: BillingMonth,
    #[validate(length(min = 1, max = 50), nested)]
    pub bills: Vec<BulkBillLine>,
}

impl BulkAddBillsRequest {
    pub fn specs(self, currency: Currency, today: NaiveDate) -> (PropertyId, BillingMonth, Vec<BulkBillSpec>) {
        let specs = self
            .bills
            .into_iter()
            .map(|line| BulkBillSpec {
                utility_type: line.utility_type,
                provider: line.provider,
                total_amount: Money::new(line.total_amount, currency),
                due_date: line.due_date,
                bill_date: line.bill_date.unwrap_or(today),
                notes: line.notes,
            })
            .collect();
        (self.property_id, self.billing_month, specs)
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerPaidRequest {
    pub paid: bool,
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct MonthRangeQuery {
    pub property_id: PropertyId,
    pub start: BillingMonth,
    pub end: BillingMonth,
}
