//! Row types and their conversion into domain values
//!
//! Enumerations the domain owns (utility type, payment method, currency,
//! billing month) are stored as text and parsed back through the domain's
//! own `FromStr`, so a value the domain would reject never leaves this module.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::{Currency, Money, Percentage};
use domain_allocation::{AllocationSetting, Lease, LeaseStatus, Property};
use domain_billing::{EntryKind, TenantUtilityCharge, UtilityBill, UtilityPayment};

use crate::error::DatabaseError;

pub(crate) const PROPERTY_COLUMNS: &str = "property_id, owner_id, name, address";

pub(crate) const LEASE_COLUMNS: &str =
    "lease_id, property_id, unit_id, unit_label, tenant_name, status, start_date, end_date";

pub(crate) const SETTING_COLUMNS: &str =
    "allocation_id, lease_id, utility_type, responsibility_percentage, updated_at";

pub(crate) const BILL_COLUMNS: &str = "bill_id, owner_id, property_id, utility_type, provider, billing_month, \
     total_amount, currency, bill_date, due_date, owner_paid, owner_paid_date, is_paid, paid_date, notes, \
     document_id, created_at, updated_at";

pub(crate) const CHARGE_COLUMNS: &str = "charge_id, bill_id, lease_id, property_id, owner_id, tenant_name, \
     unit_label, charged_amount, currency, responsibility_percentage, due_date, is_paid, paid_date, notes, \
     created_at, updated_at";

pub(crate) const PAYMENT_COLUMNS: &str = "payment_id, charge_id, bill_id, lease_id, property_id, owner_id, \
     kind, amount, currency, payment_date, method, reference, notes, created_at";

fn parse<T>(column: &str, value: &str) -> Result<T, DatabaseError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e| DatabaseError::serialization(column, e))
}

fn percentage(column: &str, value: Decimal) -> Result<Percentage, DatabaseError> {
    Percentage::new(value).map_err(|e| DatabaseError::serialization(column, e))
}

fn money(amount: Decimal, currency: &str) -> Result<Money, DatabaseError> {
    Ok(Money::new(amount, parse::<Currency>("currency", currency)?))
}

/// Lease status (maps to PostgreSQL enum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "lease_status", rename_all = "snake_case")]
pub enum DbLeaseStatus {
    Pending,
    Active,
    Expired,
    Terminated,
}

impl From<LeaseStatus> for DbLeaseStatus {
    fn from(status: LeaseStatus) -> Self {
        match status {
            LeaseStatus::Pending => DbLeaseStatus::Pending,
            LeaseStatus::Active => DbLeaseStatus::Active,
            LeaseStatus::Expired => DbLeaseStatus::Expired,
            LeaseStatus::Terminated => DbLeaseStatus::Terminated,
        }
    }
}

impl From<DbLeaseStatus> for LeaseStatus {
    fn from(status: DbLeaseStatus) -> Self {
        match status {
            DbLeaseStatus::Pending => LeaseStatus::Pending,
            DbLeaseStatus::Active => LeaseStatus::Active,
            DbLeaseStatus::Expired => LeaseStatus::Expired,
            DbLeaseStatus::Terminated => LeaseStatus::Terminated,
        }
    }
}

/// Ledger entry kind (maps to PostgreSQL enum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "ledger_entry_kind", rename_all = "snake_case")]
pub enum DbEntryKind {
    Payment,
    Reversal,
}

impl From<EntryKind> for DbEntryKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Payment => DbEntryKind::Payment,
            EntryKind::Reversal => DbEntryKind::Reversal,
        }
    }
}

impl From<DbEntryKind> for EntryKind {
    fn from(kind: DbEntryKind) -> Self {
        match kind {
            DbEntryKind::Payment => EntryKind::Payment,
            DbEntryKind::Reversal => EntryKind::Reversal,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyRow {
    pub property_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: Option<String>,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        Property {
            id: row.property_id.into(),
            owner_id: row.owner_id.into(),
            name: row.name,
            address: row.address,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaseRow {
    pub lease_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub unit_label: Option<String>,
    pub tenant_name: String,
    pub status: DbLeaseStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl From<LeaseRow> for Lease {
    fn from(row: LeaseRow) -> Self {
        Lease {
            id: row.lease_id.into(),
            property_id: row.property_id.into(),
            unit_id: row.unit_id.map(Into::into),
            unit_label: row.unit_label,
            tenant_name: row.tenant_name,
            status: row.status.into(),
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SettingRow {
    pub allocation_id: Uuid,
    pub lease_id: Uuid,
    pub utility_type: String,
    pub responsibility_percentage: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SettingRow> for AllocationSetting {
    type Error = DatabaseError;

    fn try_from(row: SettingRow) -> Result<Self, Self::Error> {
        Ok(AllocationSetting {
            id: row.allocation_id.into(),
            lease_id: row.lease_id.into(),
            utility_type: parse("utility_type", &row.utility_type)?,
            percentage: percentage("responsibility_percentage", row.responsibility_percentage)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillRow {
    pub bill_id: Uuid,
    pub owner_id: Uuid,
    pub property_id: Uuid,
    pub utility_type: String,
    pub provider: String,
    pub billing_month: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub owner_paid: bool,
    pub owner_paid_date: Option<NaiveDate>,
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BillRow> for UtilityBill {
    type Error = DatabaseError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        Ok(UtilityBill {
            id: row.bill_id.into(),
            owner_id: row.owner_id.into(),
            property_id: row.property_id.into(),
            utility_type: parse("utility_type", &row.utility_type)?,
            provider: row.provider,
            billing_month: parse("billing_month", &row.billing_month)?,
            total_amount: money(row.total_amount, &row.currency)?,
            bill_date: row.bill_date,
            due_date: row.due_date,
            owner_paid: row.owner_paid,
            owner_paid_date: row.owner_paid_date,
            is_paid: row.is_paid,
            paid_date: row.paid_date,
            notes: row.notes,
            document_id: row.document_id.map(Into::into),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChargeRow {
    pub charge_id: Uuid,
    pub bill_id: Uuid,
    pub lease_id: Uuid,
    pub property_id: Uuid,
    pub owner_id: Uuid,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub charged_amount: Decimal,
    pub currency: String,
    pub responsibility_percentage: Decimal,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ChargeRow> for TenantUtilityCharge {
    type Error = DatabaseError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        Ok(TenantUtilityCharge {
            id: row.charge_id.into(),
            bill_id: row.bill_id.into(),
            lease_id: row.lease_id.into(),
            property_id: row.property_id.into(),
            owner_id: row.owner_id.into(),
            tenant_name: row.tenant_name,
            unit_label: row.unit_label,
            charged_amount: money(row.charged_amount, &row.currency)?,
            responsibility_percentage: percentage("responsibility_percentage", row.responsibility_percentage)?,
            due_date: row.due_date,
            is_paid: row.is_paid,
            paid_date: row.paid_date,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub charge_id: Uuid,
    pub bill_id: Uuid,
    pub lease_id: Uuid,
    pub property_id: Uuid,
    pub owner_id: Uuid,
    pub kind: DbEntryKind,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for UtilityPayment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(UtilityPayment {
            id: row.payment_id.into(),
            charge_id: row.charge_id.into(),
            bill_id: row.bill_id.into(),
            lease_id: row.lease_id.into(),
            property_id: row.property_id.into(),
            owner_id: row.owner_id.into(),
            kind: row.kind.into(),
            amount: money(row.amount, &row.currency)?,
            payment_date: row.payment_date,
            method: parse("method", &row.method)?,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

/// Converts a batch of rows, failing on the first value the domain rejects
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_allocation::UtilityType;
    use rust_decimal_macros::dec;

    fn bill_row() -> BillRow {
        let now = Utc::now();
        BillRow {
            bill_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            utility_type: "Electric".to_string(),
            provider: "City Power".to_string(),
            billing_month: "2024-03".to_string(),
            total_amount: dec!(300.0000),
            currency: "USD".to_string(),
            bill_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
            owner_paid: false,
            owner_paid_date: None,
            is_paid: false,
            paid_date: None,
            notes: None,
            document_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_bill_row_converts() {
        let bill = UtilityBill::try_from(bill_row()).unwrap();
        assert_eq!(bill.utility_type, UtilityType::Electric);
        assert_eq!(bill.billing_month.to_string(), "2024-03");
        assert_eq!(bill.total_amount.amount(), dec!(300));
        assert_eq!(bill.total_amount.currency(), Currency::USD);
    }

    #[test]
    fn test_unknown_utility_type_is_serialization_error() {
        let mut row = bill_row();
        row.utility_type = "Steam".to_string();
        let err = UtilityBill::try_from(row).unwrap_err();
        assert!(matches!(err, DatabaseError::SerializationError(_)));
        assert!(err.to_string().contains("utility_type"));
    }

    #[test]
    fn test_out_of_range_percentage_is_rejected() {
        let row = SettingRow {
            allocation_id: Uuid::new_v4(),
            lease_id: Uuid::new_v4(),
            utility_type: "Water".to_string(),
            responsibility_percentage: dec!(120),
            updated_at: Utc::now(),
        };
        assert!(AllocationSetting::try_from(row).is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [LeaseStatus::Pending, LeaseStatus::Active, LeaseStatus::Expired, LeaseStatus::Terminated] {
            assert_eq!(LeaseStatus::from(DbLeaseStatus::from(status)), status);
        }
    }
}
