//! Utility bills
//!
//! One bill is one invoice from a utility company, for one utility type at
//! one property and one billing month. `(property, utility type, month)` is
//! unique.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{BillingMonth, DocumentId, Money, PropertyId, UserId, UtilityBillId};
use domain_allocation::UtilityType;

use crate::error::BillingError;

/// A utility invoice received by the property owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityBill {
    pub id: UtilityBillId,
    pub owner_id: UserId,
    pub property_id: PropertyId,
    pub utility_type: UtilityType,
    pub provider: String,
    pub billing_month: BillingMonth,
    pub total_amount: Money,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Owner has paid the utility company
    pub owner_paid: bool,
    pub owner_paid_date: Option<NaiveDate>,
    /// Every tenant charge on this bill is paid; derived from the charges
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub document_id: Option<DocumentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UtilityBill {
    /// Builds an unpaid bill from a validated request
    pub fn from_request(owner_id: UserId, request: NewBill, now: DateTime<Utc>) -> Self {
        Self {
            id: UtilityBillId::new_v7(),
            owner_id,
            property_id: request.property_id,
            utility_type: request.utility_type,
            provider: request.provider.trim().to_string(),
            billing_month: request.billing_month,
            total_amount: request.total_amount.round_to_currency(),
            bill_date: request.bill_date,
            due_date: request.due_date,
            owner_paid: false,
            owner_paid_date: None,
            is_paid: false,
            paid_date: None,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            document_id: request.document_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the owner still owes the utility company and the due date has passed
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        !self.owner_paid && self.due_date < today
    }

    /// Whole days past the due date, zero when not yet due
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days().max(0)
    }
}

fn validate_amount(amount: &Money) -> Result<(), BillingError> {
    if !amount.is_positive() {
        return Err(BillingError::validation("Amount must be greater than 0"));
    }
    if !amount.is_in_minor_units() {
        return Err(BillingError::validation(format!(
            "Amount cannot have more than {} decimal places",
            amount.currency().decimal_places()
        )));
    }
    Ok(())
}

fn validate_provider(provider: &str) -> Result<(), BillingError> {
    if provider.trim().is_empty() {
        return Err(BillingError::validation("Provider is required"));
    }
    Ok(())
}

/// Request to add a single bill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub property_id: PropertyId,
    pub utility_type: UtilityType,
    pub provider: String,
    pub billing_month: BillingMonth,
    pub total_amount: Money,
    pub due_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub notes: Option<String>,
    pub document_id: Option<DocumentId>,
}

impl NewBill {
    pub fn validate(&self) -> Result<(), BillingError> {
        validate_amount(&self.total_amount)?;
        validate_provider(&self.provider)
    }
}

/// Partial update of a bill; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillUpdate {
    pub provider: Option<String>,
    pub billing_month: Option<BillingMonth>,
    pub total_amount: Option<Money>,
    pub bill_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub document_id: Option<DocumentId>,
    pub owner_paid: Option<bool>,
    pub owner_paid_date: Option<NaiveDate>,
}

impl BillUpdate {
    pub fn validate(&self) -> Result<(), BillingError> {
        if let Some(amount) = &self.total_amount {
            validate_amount(amount)?;
        }
        if let Some(provider) = &self.provider {
            validate_provider(provider)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.provider.is_none()
            && self.billing_month.is_none()
            && self.total_amount.is_none()
            && self.bill_date.is_none()
            && self.due_date.is_none()
            && self.notes.is_none()
            && self.document_id.is_none()
            && self.owner_paid.is_none()
            && self.owner_paid_date.is_none()
    }
}

/// One line of a bulk entry; property and month come from the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkBillSpec {
    pub utility_type: UtilityType,
    pub provider: String,
    pub total_amount: Money,
    pub due_date: NaiveDate,
    pub bill_date: NaiveDate,
    pub notes: Option<String>,
}

impl BulkBillSpec {
    pub fn into_request(self, property_id: PropertyId, billing_month: BillingMonth) -> NewBill {
        NewBill {
            property_id,
            utility_type: self.utility_type,
            provider: self.provider,
            billing_month,
            total_amount: self.total_amount,
            due_date: self.due_date,
            bill_date: self.bill_date,
            notes: self.notes,
            document_id: None,
        }
    }
}

/// Filters for listing bills; all are optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillFilter {
    pub property_id: Option<PropertyId>,
    pub billing_month: Option<BillingMonth>,
    pub utility_type: Option<UtilityType>,
    /// Matches the owner-paid-the-utility-company flag
    pub owner_paid: Option<bool>,
}

/// Store-level bill query
#[derive(Debug, Clone)]
pub struct BillQuery {
    pub owner_id: UserId,
    pub property_id: Option<PropertyId>,
    pub billing_month: Option<BillingMonth>,
    pub utility_type: Option<UtilityType>,
    pub owner_paid: Option<bool>,
    pub from_month: Option<BillingMonth>,
    pub to_month: Option<BillingMonth>,
}

impl BillQuery {
    pub fn for_owner(owner_id: UserId) -> Self {
        Self {
            owner_id,
            property_id: None,
            billing_month: None,
            utility_type: None,
            owner_paid: None,
            from_month: None,
            to_month: None,
        }
    }

    pub fn with_filter(mut self, filter: &BillFilter) -> Self {
        self.property_id = filter.property_id;
        self.billing_month = filter.billing_month;
        self.utility_type = filter.utility_type;
        self.owner_paid = filter.owner_paid;
        self
    }

    pub fn property(mut self, property_id: Option<PropertyId>) -> Self {
        self.property_id = property_id;
        self
    }

    pub fn months(mut self, from: BillingMonth, to: BillingMonth) -> Self {
        self.from_month = Some(from);
        self.to_month = Some(to);
        self
    }

    pub fn matches(&self, bill: &UtilityBill) -> bool {
        bill.owner_id == self.owner_id
            && self.property_id.map_or(true, |p| bill.property_id == p)
            && self.billing_month.map_or(true, |m| bill.billing_month == m)
            && self.utility_type.map_or(true, |t| bill.utility_type == t)
            && self.owner_paid.map_or(true, |paid| bill.owner_paid == paid)
            && self.from_month.map_or(true, |m| bill.billing_month >= m)
            && self.to_month.map_or(true, |m| bill.billing_month <= m)
    }
}

/// Outcome of one failed line in a bulk entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemError {
    pub index: usize,
    pub utility_type: UtilityType,
    pub kind: crate::error::ErrorKind,
    pub message: String,
}

/// A bill that was created but could not be given charges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemWarning {
    pub bill_id: UtilityBillId,
    pub utility_type: UtilityType,
    pub message: String,
}

/// Result of a bulk entry: created ids plus per-line failures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkAddResult {
    pub created_bill_ids: Vec<UtilityBillId>,
    pub errors: Vec<BulkItemError>,
    pub warnings: Vec<BulkItemWarning>,
    pub success: bool,
}

/// A bill the owner has not yet paid to the utility company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpaidBill {
    #[serde(flatten)]
    pub bill: UtilityBill,
    pub property_name: String,
}

/// Bill totals for one month of a property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyBillTotal {
    pub billing_month: BillingMonth,
    pub total_amount: Money,
    pub bill_count: usize,
    pub by_type: BTreeMap<UtilityType, Money>,
    pub bills: Vec<UtilityBill>,
}

/// Sorts bills newest month first, then by utility type
pub fn sort_newest_first(bills: &mut [UtilityBill]) {
    bills.sort_by(|a, b| {
        b.billing_month
            .cmp(&a.billing_month)
            .then(a.utility_type.cmp(&b.utility_type))
    });
}
