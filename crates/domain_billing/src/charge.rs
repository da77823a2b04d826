//! Tenant utility charges
//!
//! A charge is a lease's share of one bill, snapshotted when the bill's
//! charges were computed. Its paid flag is the only field that changes after
//! creation, and only through the payment ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ChargeId, LeaseId, Money, Percentage, PropertyId, UserId, UtilityBillId};

use crate::payment::UtilityPayment;

/// One lease's obligation under one bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUtilityCharge {
    pub id: ChargeId,
    pub bill_id: UtilityBillId,
    pub lease_id: LeaseId,
    pub property_id: PropertyId,
    pub owner_id: UserId,
    pub tenant_name: String,
    pub unit_label: Option<String>,
    pub charged_amount: Money,
    pub responsibility_percentage: Percentage,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantUtilityCharge {
    /// Appends a line to the notes, keeping whatever was there
    pub fn append_note(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref().trim();
        if line.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take().filter(|n| !n.is_empty()) {
            Some(existing) => format!("{}\n{}", existing, line),
            None => line.to_string(),
        });
    }

    /// Sort key shared by every charge listing: unit label, then tenant name
    pub fn display_key(&self) -> (String, String) {
        (
            self.unit_label.clone().unwrap_or_default(),
            self.tenant_name.clone(),
        )
    }
}

/// True when the bill has at least one charge and every charge is paid
///
/// The bill-level paid flag is always recomputed from this and never set
/// independently.
pub fn is_bill_settled(charges: &[TenantUtilityCharge]) -> bool {
    !charges.is_empty() && charges.iter().all(|c| c.is_paid)
}

/// A charge together with what has been paid against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeBalance {
    #[serde(flatten)]
    pub charge: TenantUtilityCharge,
    /// Net of payments and reversals
    pub paid_amount: Money,
    pub remaining: Money,
}

impl ChargeBalance {
    /// Derives paid and remaining amounts from the charge's ledger entries
    ///
    /// A charge marked paid by hand has nothing remaining, whatever its entries
    /// say.
    pub fn from_entries<'a, I>(charge: TenantUtilityCharge, entries: I) -> Self
    where
        I: IntoIterator<Item = &'a UtilityPayment>,
    {
        let currency = charge.charged_amount.currency();
        let paid_amount = entries
            .into_iter()
            .filter(|e| e.charge_id == charge.id)
            .fold(Money::zero(currency), |acc, e| acc + e.amount);
        let remaining = if charge.is_paid {
            Money::zero(currency)
        } else {
            let left = charge.charged_amount - paid_amount;
            if left.is_negative() { Money::zero(currency) } else { left }
        };
        Self {
            charge,
            paid_amount,
            remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn charge(amount: rust_decimal::Decimal, is_paid: bool) -> TenantUtilityCharge {
        let now = Utc::now();
        TenantUtilityCharge {
            id: ChargeId::new(),
            bill_id: UtilityBillId::new(),
            lease_id: LeaseId::new(),
            property_id: PropertyId::new(),
            owner_id: UserId::new(),
            tenant_name: "Alice".to_string(),
            unit_label: Some("1A".to_string()),
            charged_amount: Money::new(amount, Currency::USD),
            responsibility_percentage: Percentage::new(dec!(50)).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
            is_paid,
            paid_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_bill_settled_requires_every_charge() {
        assert!(!is_bill_settled(&[]));
        assert!(is_bill_settled(&[charge(dec!(10), true), charge(dec!(5), true)]));
        assert!(!is_bill_settled(&[charge(dec!(10), true), charge(dec!(5), false)]));
    }

    #[test]
    fn test_append_note_concatenates() {
        let mut c = charge(dec!(10), true);
        c.append_note("Paid in person");
        c.append_note("Payment reversed: check bounced");
        assert_eq!(
            c.notes.as_deref(),
            Some("Paid in person\nPayment reversed: check bounced")
        );
        c.append_note("  ");
        assert_eq!(c.notes.as_deref().map(|n| n.lines().count()), Some(2));
    }
}
