//! Payment ledger entries
//!
//! Entries are append-only. A payment adds a positive amount to a charge; a
//! reversal adds the negated net amount so that the entries of a charge always
//! sum to what is currently considered paid.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ChargeId, LeaseId, Money, PaymentId, PropertyId, UserId, UtilityBillId};

use crate::charge::TenantUtilityCharge;
use crate::error::BillingError;

/// How the tenant paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    Cash,
    Check,
    #[serde(rename = "Credit Card")]
    CreditCard,
    #[serde(rename = "Debit Card")]
    DebitCard,
    #[serde(rename = "Money Order")]
    MoneyOrder,
    Online,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        PaymentMethod::BankTransfer,
        PaymentMethod::Cash,
        PaymentMethod::Check,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::MoneyOrder,
        PaymentMethod::Online,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "Bank Transfer",
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Check => "Check",
            PaymentMethod::CreditCard => "Credit Card",
            PaymentMethod::DebitCard => "Debit Card",
            PaymentMethod::MoneyOrder => "Money Order",
            PaymentMethod::Online => "Online",
            PaymentMethod::Other => "Other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BillingError::validation(format!("Unknown payment method: {}", s)))
    }
}

/// Whether an entry applies money or takes it back out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Payment,
    Reversal,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Payment => "payment",
            EntryKind::Reversal => "reversal",
        }
    }
}

impl FromStr for EntryKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(EntryKind::Payment),
            "reversal" => Ok(EntryKind::Reversal),
            other => Err(BillingError::validation(format!("Unknown entry kind: {}", other))),
        }
    }
}

/// A ledger entry against one charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilityPayment {
    pub id: PaymentId,
    pub charge_id: ChargeId,
    pub bill_id: UtilityBillId,
    pub lease_id: LeaseId,
    pub property_id: PropertyId,
    pub owner_id: UserId,
    pub kind: EntryKind,
    /// Positive for payments, negative for reversals
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UtilityPayment {
    /// A payment of `amount` against `charge`
    pub fn payment(
        charge: &TenantUtilityCharge,
        amount: Money,
        payment_date: NaiveDate,
        method: PaymentMethod,
    ) -> Self {
        Self::entry(charge, EntryKind::Payment, amount, payment_date, method)
    }

    /// A reversal taking `net_paid` back out of `charge`
    pub fn reversal(charge: &TenantUtilityCharge, net_paid: Money, date: NaiveDate, reason: &str) -> Self {
        let mut entry = Self::entry(charge, EntryKind::Reversal, -net_paid, date, PaymentMethod::Other);
        entry.notes = Some(reason.to_string());
        entry
    }

    fn entry(
        charge: &TenantUtilityCharge,
        kind: EntryKind,
        amount: Money,
        payment_date: NaiveDate,
        method: PaymentMethod,
    ) -> Self {
        Self {
            id: PaymentId::new_v7(),
            charge_id: charge.id,
            bill_id: charge.bill_id,
            lease_id: charge.lease_id,
            property_id: charge.property_id,
            owner_id: charge.owner_id,
            kind,
            amount,
            payment_date,
            method,
            reference: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the external reference (check number, transfer id)
    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn is_payment(&self) -> bool {
        self.kind == EntryKind::Payment
    }
}
