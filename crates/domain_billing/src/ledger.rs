//! Payment ledger
//!
//! Records money applied to tenant charges and derives paid state from it.
//! Ledger entries are append-only: a reversal adds a compensating entry
//! instead of touching the original payments.
//!
//! # Invariants
//!
//! - The net of a charge's entries never exceeds its charged amount
//! - A charge is paid when its entries cover it, or when marked paid by hand
//! - A bill is paid exactly when it has charges and all of them are paid;
//!   this is recomputed in the same store write that changes a charge
//!
//! The service checks a request against what it read, then the store checks
//! it again with `LedgerWrite::resolve` under its lock. Two payments racing
//! for the same balance cannot both land.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use core_kernel::{ChargeId, Clock, Money, PaymentId, PortError, UserId};

use crate::bill::UtilityBill;
use crate::charge::{is_bill_settled, TenantUtilityCharge};
use crate::error::BillingError;
use crate::payment::{EntryKind, PaymentMethod, UtilityPayment};
use crate::ports::{BillingStore, LedgerOutcome, LedgerWrite};

/// A payment to record against one charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub charge_id: ChargeId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Result of a recorded payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: PaymentId,
    pub charge_id: ChargeId,
    pub amount: Money,
    pub remaining_balance: Money,
    pub is_fully_paid: bool,
    pub all_charges_paid_on_bill: bool,
}

/// Result of a manual paid/unpaid override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaidOutcome {
    pub charge_id: ChargeId,
    pub is_paid: bool,
    pub all_charges_paid_on_bill: bool,
}

/// Result of a reversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalOutcome {
    pub charge_id: ChargeId,
    /// Net amount taken back out of the ledger; zero for a charge that was
    /// only marked paid by hand
    pub reversed_amount: Money,
}

/// Net of a charge's entries
pub fn net_paid(charge: &TenantUtilityCharge, entries: &[UtilityPayment]) -> Money {
    entries
        .iter()
        .filter(|e| e.charge_id == charge.id)
        .fold(Money::zero(charge.charged_amount.currency()), |acc, e| acc + e.amount)
}

/// Re-derives the bill's paid flag from its charges
///
/// `date` becomes the bill's paid date when this change settles it. A bill
/// that was already settled keeps its original date.
pub fn settle_bill(bill: &mut UtilityBill, charges: &[TenantUtilityCharge], date: NaiveDate) {
    let settled = is_bill_settled(charges);
    bill.paid_date = match (settled, bill.is_paid) {
        (true, true) => bill.paid_date.or(Some(date)),
        (true, false) => Some(date),
        (false, _) => None,
    };
    bill.is_paid = settled;
}

/// What is still owed on a charge
fn outstanding(charge: &TenantUtilityCharge, paid: Money) -> Money {
    if charge.is_paid {
        Money::zero(charge.charged_amount.currency())
    } else {
        (charge.charged_amount - paid).max_zero()
    }
}

/// A ledger write that no longer fits the ledger it is applied to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ledger for charge {charge_id} changed: {reason}")]
pub struct LedgerConflict {
    pub charge_id: ChargeId,
    pub reason: String,
}

impl From<LedgerConflict> for PortError {
    fn from(conflict: LedgerConflict) -> Self {
        PortError::conflict(conflict.to_string())
    }
}

impl LedgerWrite {
    /// Settles the write against the ledger as it currently stands
    ///
    /// `siblings` holds every charge of `bill` and `entries` the charge's
    /// entries, read under the same lock or transaction the result is
    /// written in. The charge's paid flag follows from the entries when a
    /// payment is recorded, and the bill's from its sibling charges.
    pub fn resolve(
        self,
        mut bill: UtilityBill,
        mut siblings: Vec<TenantUtilityCharge>,
        entries: &[UtilityPayment],
    ) -> Result<(Option<UtilityPayment>, LedgerOutcome), LedgerConflict> {
        let LedgerWrite {
            entry,
            mut charge,
            settled_on,
            updated_at,
        } = self;
        let charge_id = charge.id;
        let conflict = |reason: &str| LedgerConflict {
            charge_id,
            reason: reason.to_string(),
        };

        let current = siblings
            .iter_mut()
            .find(|c| c.id == charge_id)
            .ok_or_else(|| conflict("charge is no longer part of its bill"))?;
        let paid_before = net_paid(&charge, entries);

        let paid_after = match &entry {
            Some(e) if e.kind == EntryKind::Payment => {
                let paid_after = paid_before + e.amount;
                if current.is_paid || paid_after > charge.charged_amount {
                    return Err(conflict("payment exceeds the remaining balance"));
                }
                charge.is_paid = paid_after >= charge.charged_amount;
                charge.paid_date = charge.is_paid.then_some(e.payment_date);
                paid_after
            }
            Some(e) => {
                let paid_after = paid_before + e.amount;
                if !current.is_paid || !paid_after.is_zero() {
                    return Err(conflict("reversal no longer matches the net paid amount"));
                }
                paid_after
            }
            None => {
                if !charge.is_paid && paid_before >= charge.charged_amount {
                    return Err(conflict("recorded payments cover the charge"));
                }
                paid_before
            }
        };

        charge.updated_at = updated_at;
        *current = charge.clone();
        settle_bill(&mut bill, &siblings, settled_on);
        bill.updated_at = updated_at;

        Ok((
            entry,
            LedgerOutcome {
                charge,
                bill,
                net_paid: paid_after,
            },
        ))
    }
}

/// Service recording payments, overrides and reversals
pub struct PaymentLedger<S: BillingStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: BillingStore + ?Sized> Clone for PaymentLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: BillingStore + ?Sized> PaymentLedger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Loads a charge and checks that `user` owns it
    pub async fn owned_charge(&self, user: UserId, charge_id: ChargeId) -> Result<TenantUtilityCharge, BillingError> {
        let charge = self.store.get_charge(charge_id).await?;
        if charge.owner_id != user {
            return Err(BillingError::permission_denied(charge_id));
        }
        Ok(charge)
    }

    /// Hands the write to the store, which settles it under its own lock
    async fn commit(
        &self,
        charge: TenantUtilityCharge,
        entry: Option<UtilityPayment>,
        settled_on: NaiveDate,
    ) -> Result<LedgerOutcome, BillingError> {
        let write = LedgerWrite {
            entry,
            charge,
            settled_on,
            updated_at: self.clock.now(),
        };
        Ok(self.store.apply_ledger_write(write).await?)
    }

    /// Records a payment against one charge
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount or one finer than the
    ///   currency's minor unit
    /// - `Overpayment` carrying the remaining balance when the amount exceeds
    ///   it, including when another payment took the balance first
    #[instrument(skip(self, request), fields(charge_id = %request.charge_id, amount = %request.amount))]
    pub async fn record_payment(&self, user: UserId, request: PaymentRequest) -> Result<PaymentReceipt, BillingError> {
        if request.amount <= Decimal::ZERO {
            return Err(BillingError::validation("Payment amount must be greater than 0"));
        }
        let charge = self.owned_charge(user, request.charge_id).await?;
        let currency = charge.charged_amount.currency();
        if !currency.fits_minor_units(request.amount) {
            return Err(BillingError::validation(format!(
                "Payment amount cannot have more than {} decimal places",
                currency.decimal_places()
            )));
        }
        let amount = Money::new(request.amount, currency);

        let entries = self.store.entries_for_charge(charge.id).await?;
        let remaining = outstanding(&charge, net_paid(&charge, &entries));
        if amount > remaining {
            warn!(charge_id = %charge.id, %amount, %remaining, "Rejected overpayment");
            return Err(BillingError::Overpayment { remaining });
        }

        let entry = UtilityPayment::payment(&charge, amount, request.payment_date, request.method)
            .with_reference(request.reference)
            .with_notes(request.notes);
        let payment_id = entry.id;
        let charge_id = charge.id;

        let outcome = match self.commit(charge, Some(entry), request.payment_date).await {
            Err(BillingError::Store(e)) if e.is_conflict() => {
                let charge = self.store.get_charge(charge_id).await?;
                let entries = self.store.entries_for_charge(charge_id).await?;
                let remaining = outstanding(&charge, net_paid(&charge, &entries));
                warn!(%charge_id, %amount, %remaining, "Rejected payment raced by another ledger write");
                return Err(BillingError::Overpayment { remaining });
            }
            other => other?,
        };
        let remaining_balance = outstanding(&outcome.charge, outcome.net_paid);
        info!(%charge_id, %payment_id, %amount, %remaining_balance, "Recorded payment");

        Ok(PaymentReceipt {
            payment_id,
            charge_id,
            amount,
            remaining_balance,
            is_fully_paid: outcome.charge.is_paid,
            all_charges_paid_on_bill: outcome.bill.is_paid,
        })
    }

    /// Sets a charge's paid flag directly, without a ledger entry
    ///
    /// Marking unpaid is refused when recorded payments already cover the
    /// charge; that needs a reversal so the ledger stays consistent.
    #[instrument(skip(self, notes))]
    pub async fn mark_paid(
        &self,
        user: UserId,
        charge_id: ChargeId,
        is_paid: bool,
        notes: Option<String>,
    ) -> Result<MarkPaidOutcome, BillingError> {
        let mut charge = self.owned_charge(user, charge_id).await?;
        if !is_paid {
            let entries = self.store.entries_for_charge(charge_id).await?;
            if net_paid(&charge, &entries) >= charge.charged_amount {
                warn!(%charge_id, "Refused to mark a fully paid charge as unpaid");
                return Err(BillingError::validation(
                    "Recorded payments cover this charge; reverse the payment instead",
                ));
            }
        }

        let today = self.clock.today();
        if charge.is_paid != is_paid {
            charge.is_paid = is_paid;
            charge.paid_date = is_paid.then_some(today);
        }
        if let Some(notes) = notes {
            charge.append_note(notes);
        }

        let outcome = self.commit(charge, None, today).await?;
        let all_charges_paid_on_bill = outcome.bill.is_paid;
        info!(%charge_id, is_paid, all_charges_paid_on_bill, "Marked charge");
        Ok(MarkPaidOutcome {
            charge_id,
            is_paid,
            all_charges_paid_on_bill,
        })
    }

    /// Reverses a paid charge back to unpaid
    ///
    /// The reason is appended to the charge notes and, when money had been
    /// recorded, a compensating entry for the net paid amount is added.
    #[instrument(skip(self, reason))]
    pub async fn reverse_payment(
        &self,
        user: UserId,
        charge_id: ChargeId,
        reason: &str,
    ) -> Result<ReversalOutcome, BillingError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BillingError::validation("Reversal reason is required"));
        }
        let mut charge = self.owned_charge(user, charge_id).await?;
        if !charge.is_paid {
            warn!(%charge_id, "Rejected reversal of unpaid charge");
            return Err(BillingError::NotPaid(charge_id));
        }

        let entries = self.store.entries_for_charge(charge_id).await?;
        let paid = net_paid(&charge, &entries);
        let today = self.clock.today();
        let entry = paid
            .is_positive()
            .then(|| UtilityPayment::reversal(&charge, paid, today, reason));
        let reversed_amount = paid.max_zero();

        charge.is_paid = false;
        charge.paid_date = None;
        charge.append_note(format!("Payment reversed: {}", reason));

        self.commit(charge, entry, today).await?;
        info!(%charge_id, %reversed_amount, "Reversed payment");
        Ok(ReversalOutcome {
            charge_id,
            reversed_amount,
        })
    }
}
