//! Bill lifecycle and bill queries
//!
//! `BillService` owns every write to bills and their charges. Charges are
//! always produced by the calculator and written in the same store call as the
//! bill, so a reader never sees a bill with half its charges.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{BillingMonth, Clock, Currency, Money, PortError, PropertyId, UserId, UtilityBillId};
use domain_allocation::{AllocationStore, Property, UtilityType};

use crate::bill::{
    sort_newest_first, BillFilter, BillQuery, BillUpdate, BulkAddResult, BulkBillSpec, BulkItemError,
    BulkItemWarning, MonthlyBillTotal, NewBill, UnpaidBill, UtilityBill,
};
use crate::calculator::{owner_share, ChargeCalculator, SplitPreview};
use crate::charge::{ChargeBalance, TenantUtilityCharge};
use crate::error::BillingError;
use crate::ports::{BillingStore, BillingStoreExt};

/// A bill with its charges and what has been paid against each
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillWithCharges {
    #[serde(flatten)]
    pub bill: UtilityBill,
    pub charges: Vec<ChargeBalance>,
    pub tenant_percentage: Decimal,
    pub owner_share: Money,
}

/// Service for adding, editing and listing utility bills
pub struct BillService<S: BillingStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    currency: Currency,
}

impl<S: BillingStore + ?Sized> Clone for BillService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            currency: self.currency,
        }
    }
}

impl<S: BillingStore + ?Sized> BillService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            currency: Currency::default(),
        }
    }

    /// Sets the currency bills must be entered in
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    async fn owned_property(&self, user: UserId, property_id: PropertyId) -> Result<Property, BillingError> {
        let property = self.store.get_property(property_id).await?;
        if !property.is_owned_by(user) {
            return Err(BillingError::permission_denied(property_id));
        }
        Ok(property)
    }

    async fn owned_bill(&self, user: UserId, bill_id: UtilityBillId) -> Result<UtilityBill, BillingError> {
        let bill = self.store.get_bill(bill_id).await?;
        if bill.owner_id != user {
            return Err(BillingError::permission_denied(bill_id));
        }
        Ok(bill)
    }

    fn ensure_currency(&self, amount: &Money) -> Result<(), BillingError> {
        if amount.currency() != self.currency {
            return Err(BillingError::validation(format!(
                "Bill amounts must be in {}, got {}",
                self.currency,
                amount.currency()
            )));
        }
        Ok(())
    }

    async fn ensure_unique(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        billing_month: BillingMonth,
    ) -> Result<(), BillingError> {
        if self
            .store
            .find_bill(property_id, utility_type, billing_month)
            .await?
            .is_some()
        {
            warn!(%property_id, %utility_type, %billing_month, "Rejected duplicate bill");
            return Err(BillingError::DuplicateBill {
                utility_type,
                billing_month,
            });
        }
        Ok(())
    }

    /// Refuses to rebuild or drop a bill's charges once money has moved
    async fn ensure_charges_replaceable(&self, bill: &UtilityBill) -> Result<Vec<TenantUtilityCharge>, BillingError> {
        let charges = self.store.charges_for_bill(bill.id).await?;
        let entries = self.store.entries_for_bill(bill.id).await?;
        let blocking = entries.len() + charges.iter().filter(|c| c.is_paid).count();
        if blocking > 0 {
            warn!(bill_id = %bill.id, blocking, "Charge set is locked by payments");
            return Err(BillingError::RecomputeBlocked {
                bill_id: bill.id,
                entries: blocking,
            });
        }
        Ok(charges)
    }

    fn duplicate_or(error: PortError, bill: &UtilityBill) -> BillingError {
        if error.is_conflict() {
            BillingError::DuplicateBill {
                utility_type: bill.utility_type,
                billing_month: bill.billing_month,
            }
        } else {
            error.into()
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Adds one bill with its charges, or nothing at all
    #[instrument(skip(self, request), fields(property_id = %request.property_id, utility_type = %request.utility_type))]
    pub async fn add_bill(&self, user: UserId, request: NewBill) -> Result<UtilityBill, BillingError> {
        request.validate()?;
        self.ensure_currency(&request.total_amount)?;
        self.owned_property(user, request.property_id).await?;
        self.ensure_unique(request.property_id, request.utility_type, request.billing_month)
            .await?;

        let now = self.clock.now();
        let bill = UtilityBill::from_request(user, request, now);
        let charges = match ChargeCalculator::compute_for(self.store.as_ref(), &bill, now).await {
            Ok(charges) => charges,
            Err(e) => {
                warn!(bill_id = %bill.id, error = %e, "Rejected bill");
                return Err(e);
            }
        };
        let count = charges.len();
        self.store
            .insert_bill(bill.clone(), charges)
            .await
            .map_err(|e| Self::duplicate_or(e, &bill))?;

        info!(bill_id = %bill.id, charges = count, amount = %bill.total_amount, "Added bill");
        Ok(bill)
    }

    /// Adds several bills for one property and month
    ///
    /// Lines are independent: a failed line is reported and the rest still go
    /// in. A line whose allocations exceed 100% is saved without charges and
    /// reported as a warning so the invoice is not lost.
    #[instrument(skip(self, specs), fields(count = specs.len()))]
    pub async fn bulk_add_bills(
        &self,
        user: UserId,
        property_id: PropertyId,
        billing_month: BillingMonth,
        specs: Vec<BulkBillSpec>,
    ) -> Result<BulkAddResult, BillingError> {
        self.owned_property(user, property_id).await?;

        let mut result = BulkAddResult::default();
        for (index, spec) in specs.into_iter().enumerate() {
            let utility_type = spec.utility_type;
            match self.add_bulk_line(user, spec.into_request(property_id, billing_month)).await {
                Ok((bill_id, warning)) => {
                    result.created_bill_ids.push(bill_id);
                    result.warnings.extend(warning);
                }
                Err(e) => {
                    warn!(index, %utility_type, error = %e, "Bulk line failed");
                    result.errors.push(BulkItemError {
                        index,
                        utility_type,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        result.success = result.errors.is_empty();

        info!(
            %property_id,
            created = result.created_bill_ids.len(),
            failed = result.errors.len(),
            "Bulk added bills"
        );
        Ok(result)
    }

    async fn add_bulk_line(
        &self,
        user: UserId,
        request: NewBill,
    ) -> Result<(UtilityBillId, Option<BulkItemWarning>), BillingError> {
        request.validate()?;
        self.ensure_currency(&request.total_amount)?;
        self.ensure_unique(request.property_id, request.utility_type, request.billing_month)
            .await?;

        let now = self.clock.now();
        let bill = UtilityBill::from_request(user, request, now);
        let (charges, warning) = match ChargeCalculator::compute_for(self.store.as_ref(), &bill, now).await {
            Ok(charges) => (charges, None),
            Err(e @ BillingError::AllocationExceeded { .. }) => (
                Vec::new(),
                Some(BulkItemWarning {
                    bill_id: bill.id,
                    utility_type: bill.utility_type,
                    message: format!("{}; bill saved without tenant charges", e),
                }),
            ),
            Err(e) => return Err(e),
        };
        self.store
            .insert_bill(bill.clone(), charges)
            .await
            .map_err(|e| Self::duplicate_or(e, &bill))?;
        Ok((bill.id, warning))
    }

    /// Applies a partial update
    ///
    /// A new amount rebuilds the charge set. A new due date is copied onto the
    /// existing charges in the same write.
    #[instrument(skip(self, update))]
    pub async fn update_bill(
        &self,
        user: UserId,
        bill_id: UtilityBillId,
        update: BillUpdate,
    ) -> Result<UtilityBill, BillingError> {
        update.validate()?;
        let mut bill = self.owned_bill(user, bill_id).await?;
        if update.is_empty() {
            return Ok(bill);
        }

        if let Some(month) = update.billing_month.filter(|m| *m != bill.billing_month) {
            self.ensure_unique(bill.property_id, bill.utility_type, month).await?;
            bill.billing_month = month;
        }
        if let Some(provider) = update.provider {
            bill.provider = provider.trim().to_string();
        }
        if let Some(bill_date) = update.bill_date {
            bill.bill_date = bill_date;
        }
        if let Some(notes) = update.notes {
            bill.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }
        if update.document_id.is_some() {
            bill.document_id = update.document_id;
        }
        if let Some(paid) = update.owner_paid {
            bill.owner_paid = paid;
            bill.owner_paid_date = if paid {
                update.owner_paid_date.or(Some(self.clock.today()))
            } else {
                None
            };
        } else if update.owner_paid_date.is_some() {
            bill.owner_paid_date = update.owner_paid_date;
        }

        let new_amount = match update.total_amount {
            Some(amount) => {
                self.ensure_currency(&amount)?;
                let amount = amount.round_to_currency();
                (amount != bill.total_amount).then_some(amount)
            }
            None => None,
        };
        let due_changed = update.due_date.filter(|d| *d != bill.due_date);
        if let Some(due) = due_changed {
            bill.due_date = due;
        }

        let now = self.clock.now();
        bill.updated_at = now;

        let charges = if let Some(amount) = new_amount {
            self.ensure_charges_replaceable(&bill).await?;
            bill.total_amount = amount;
            bill.is_paid = false;
            bill.paid_date = None;
            let charges = ChargeCalculator::compute_for(self.store.as_ref(), &bill, now).await?;
            info!(%bill_id, %amount, charges = charges.len(), "Recomputed charges");
            Some(charges)
        } else if let Some(due) = due_changed {
            let mut charges = self.store.charges_for_bill(bill_id).await?;
            for charge in &mut charges {
                charge.due_date = due;
                charge.updated_at = now;
            }
            Some(charges)
        } else {
            None
        };

        self.store
            .update_bill(bill.clone(), charges)
            .await
            .map_err(|e| Self::duplicate_or(e, &bill))?;
        info!(%bill_id, "Updated bill");
        Ok(bill)
    }

    /// Rebuilds a bill's charges from the current allocations
    ///
    /// Used after fixing allocations for a bill that was saved without charges.
    /// Running it twice with unchanged allocations yields the same amounts.
    #[instrument(skip(self))]
    pub async fn regenerate_charges(
        &self,
        user: UserId,
        bill_id: UtilityBillId,
    ) -> Result<Vec<TenantUtilityCharge>, BillingError> {
        let mut bill = self.owned_bill(user, bill_id).await?;
        self.ensure_charges_replaceable(&bill).await?;

        let now = self.clock.now();
        let charges = ChargeCalculator::compute_for(self.store.as_ref(), &bill, now).await?;
        bill.is_paid = false;
        bill.paid_date = None;
        bill.updated_at = now;
        self.store.update_bill(bill, Some(charges.clone())).await?;
        info!(%bill_id, charges = charges.len(), "Regenerated charges");
        Ok(charges)
    }

    /// Deletes a bill and its charges
    #[instrument(skip(self))]
    pub async fn delete_bill(&self, user: UserId, bill_id: UtilityBillId) -> Result<(), BillingError> {
        let bill = self.owned_bill(user, bill_id).await?;
        let charges = self.ensure_charges_replaceable(&bill).await?;
        self.store.delete_bill(bill_id).await?;
        info!(%bill_id, charges = charges.len(), "Deleted bill");
        Ok(())
    }

    /// Records whether the owner has paid the utility company
    #[instrument(skip(self))]
    pub async fn mark_owner_paid(
        &self,
        user: UserId,
        bill_id: UtilityBillId,
        paid: bool,
        paid_date: Option<NaiveDate>,
    ) -> Result<UtilityBill, BillingError> {
        let mut bill = self.owned_bill(user, bill_id).await?;
        bill.owner_paid = paid;
        bill.owner_paid_date = paid.then(|| paid_date.unwrap_or_else(|| self.clock.today()));
        bill.updated_at = self.clock.now();
        self.store.update_bill(bill.clone(), None).await?;
        info!(%bill_id, paid, "Marked owner payment");
        Ok(bill)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lists the caller's bills, newest month first
    pub async fn list_bills(&self, user: UserId, filter: BillFilter) -> Result<Vec<UtilityBill>, BillingError> {
        if let Some(property_id) = filter.property_id {
            self.owned_property(user, property_id).await?;
        }
        let mut bills = self
            .store
            .find_bills(&BillQuery::for_owner(user).with_filter(&filter))
            .await?;
        sort_newest_first(&mut bills);
        Ok(bills)
    }

    /// Loads a bill with its charges, sorted by unit then tenant
    pub async fn get_bill_with_charges(
        &self,
        user: UserId,
        bill_id: UtilityBillId,
    ) -> Result<BillWithCharges, BillingError> {
        let bill = self.owned_bill(user, bill_id).await?;
        let mut charges = self.store.charges_for_bill(bill_id).await?;
        charges.sort_by_key(|c| c.display_key());
        let ids: Vec<_> = charges.iter().map(|c| c.id).collect();
        let entries = self.store.entries_for_charges(&ids).await?;

        let owner_share = owner_share(&bill, &charges);
        let tenant_percentage: Decimal = charges.iter().map(|c| c.responsibility_percentage.value()).sum();
        let charges = charges
            .into_iter()
            .map(|c| ChargeBalance::from_entries(c, &entries))
            .collect();
        Ok(BillWithCharges {
            bill,
            charges,
            tenant_percentage,
            owner_share,
        })
    }

    /// Bills the owner has not yet paid to the utility company, soonest due first
    pub async fn list_unpaid_bills(
        &self,
        user: UserId,
        property_id: Option<PropertyId>,
    ) -> Result<Vec<UnpaidBill>, BillingError> {
        let properties: HashMap<PropertyId, String> = self
            .store
            .properties_for_owner(user)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        if let Some(id) = property_id {
            if !properties.contains_key(&id) {
                return Err(BillingError::permission_denied(id));
            }
        }

        let filter = BillFilter {
            property_id,
            owner_paid: Some(false),
            ..Default::default()
        };
        let mut bills = self
            .store
            .find_bills(&BillQuery::for_owner(user).with_filter(&filter))
            .await?;
        bills.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.utility_type.cmp(&b.utility_type)));

        Ok(bills
            .into_iter()
            .map(|bill| UnpaidBill {
                property_name: properties.get(&bill.property_id).cloned().unwrap_or_default(),
                bill,
            })
            .collect())
    }

    /// Per-month totals for a property between two months inclusive, oldest first
    pub async fn bills_by_month_range(
        &self,
        user: UserId,
        property_id: PropertyId,
        start: BillingMonth,
        end: BillingMonth,
    ) -> Result<Vec<MonthlyBillTotal>, BillingError> {
        if start > end {
            return Err(BillingError::validation(format!(
                "Start month {} is after end month {}",
                start, end
            )));
        }
        self.owned_property(user, property_id).await?;
        let bills = self
            .store
            .bills_between(user, Some(property_id), start, end)
            .await?;

        let mut by_month: BTreeMap<BillingMonth, Vec<UtilityBill>> = BTreeMap::new();
        for bill in bills {
            by_month.entry(bill.billing_month).or_default().push(bill);
        }

        by_month
            .into_iter()
            .map(|(billing_month, mut bills)| -> Result<MonthlyBillTotal, BillingError> {
                bills.sort_by_key(|b| b.utility_type);
                let mut by_type: BTreeMap<UtilityType, Money> = BTreeMap::new();
                for bill in &bills {
                    let slot = by_type
                        .entry(bill.utility_type)
                        .or_insert_with(|| Money::zero(self.currency));
                    *slot = slot.checked_add(&bill.total_amount)?;
                }
                let total_amount = Money::sum(self.currency, bills.iter().map(|b| &b.total_amount))?;
                Ok(MonthlyBillTotal {
                    billing_month,
                    total_amount,
                    bill_count: bills.len(),
                    by_type,
                    bills,
                })
            })
            .collect()
    }

    /// Shows how an amount would be split across the property's active leases
    pub async fn preview_split(
        &self,
        user: UserId,
        property_id: PropertyId,
        utility_type: UtilityType,
        total: Money,
    ) -> Result<SplitPreview, BillingError> {
        if total.is_negative() {
            return Err(BillingError::validation("Amount must not be negative"));
        }
        self.owned_property(user, property_id).await?;
        let leases = self.store.leases_for_property(property_id).await?;
        let settings = self.store.allocations_for_property(property_id).await?;
        Ok(ChargeCalculator::preview(total, utility_type, &leases, &settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::error::ErrorKind;
    use crate::testing::{date, usd, Fixture};

    fn service(fx: &Fixture) -> BillService<crate::memory::InMemoryStore> {
        BillService::new(fx.store.clone(), fx.clock.clone())
    }

    // ========================================================================
    // Adding bills
    // ========================================================================

    mod add_tests {
        use super::*;

        #[tokio::test]
        async fn test_add_bill_creates_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(60), dec!(40)]).await;
            let svc = service(&fx);

            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(300.00)))
                .await
                .unwrap();
            let view = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();

            assert_eq!(view.charges.len(), 2);
            assert_eq!(view.charges[0].charge.tenant_name, "Alice");
            assert_eq!(view.charges[0].charge.charged_amount, usd(dec!(180.00)));
            assert_eq!(view.charges[1].charge.charged_amount, usd(dec!(120.00)));
            assert!(view.owner_share.is_zero());
            assert!(!view.bill.is_paid);
        }

        #[tokio::test]
        async fn test_duplicate_month_is_rejected() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            svc.add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(300)))
                .await
                .unwrap();

            let err = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(10)))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Duplicate);
            assert_eq!(err.to_string(), "A Electric bill for 2024-03 already exists");
            let bills = svc.list_bills(fx.owner, BillFilter::default()).await.unwrap();
            assert_eq!(bills.len(), 1);
        }

        #[tokio::test]
        async fn test_add_bill_rejects_over_allocation_without_writing() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Gas, &[dec!(70), dec!(50)]).await;
            let svc = service(&fx);

            let err = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Gas, "2024-03", dec!(100)))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AllocationExceeded);
            assert!(svc.list_bills(fx.owner, BillFilter::default()).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_add_bill_for_foreign_property_is_denied() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            let err = svc
                .add_bill(UserId::new(), fx.bill(UtilityType::Water, "2024-03", dec!(10)))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Permission);
        }

        #[tokio::test]
        async fn test_add_bill_rejects_other_currency() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            let mut request = fx.bill(UtilityType::Water, "2024-03", dec!(10));
            request.total_amount = Money::new(dec!(10), Currency::EUR);
            let err = svc.add_bill(fx.owner, request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        #[tokio::test]
        async fn test_bulk_add_keeps_over_allocated_bill_without_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Gas, &[dec!(70), dec!(50)]).await;
            fx.split(UtilityType::Water, &[dec!(50), dec!(50)]).await;
            let svc = service(&fx);
            svc.add_bill(fx.owner, fx.bill(UtilityType::Trash, "2024-04", dec!(20)))
                .await
                .unwrap();

            let line = |utility_type, amount| BulkBillSpec {
                utility_type,
                provider: "City".to_string(),
                total_amount: usd(amount),
                due_date: date(2024, 4, 25),
                bill_date: date(2024, 4, 1),
                notes: None,
            };
            let result = svc
                .bulk_add_bills(
                    fx.owner,
                    fx.property.id,
                    "2024-04".parse().unwrap(),
                    vec![
                        line(UtilityType::Water, dec!(80)),
                        line(UtilityType::Gas, dec!(60)),
                        line(UtilityType::Trash, dec!(20)),
                        line(UtilityType::Sewer, dec!(0)),
                    ],
                )
                .await
                .unwrap();

            assert_eq!(result.created_bill_ids.len(), 2);
            assert_eq!(result.warnings.len(), 1);
            assert_eq!(result.warnings[0].utility_type, UtilityType::Gas);
            assert_eq!(result.errors.len(), 2);
            assert_eq!(result.errors[0].index, 2);
            assert_eq!(result.errors[0].kind, ErrorKind::Duplicate);
            assert_eq!(result.errors[1].kind, ErrorKind::Validation);
            assert!(!result.success);

            let gas = svc
                .get_bill_with_charges(fx.owner, result.warnings[0].bill_id)
                .await
                .unwrap();
            assert!(gas.charges.is_empty());
            assert!(!gas.bill.is_paid);
        }
    }

    // ========================================================================
    // Editing bills
    // ========================================================================

    mod update_tests {
        use super::*;
        use crate::ports::{BillingStore, LedgerWrite};

        fn amounts(view: &BillWithCharges) -> Vec<Money> {
            view.charges.iter().map(|c| c.charge.charged_amount).collect()
        }

        #[tokio::test]
        async fn test_amount_change_recomputes_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(60), dec!(40)]).await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(300)))
                .await
                .unwrap();

            let set_total = |amount| BillUpdate {
                total_amount: Some(usd(amount)),
                ..Default::default()
            };
            svc.update_bill(fx.owner, bill.id, set_total(dec!(250))).await.unwrap();
            let mid = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();
            svc.update_bill(fx.owner, bill.id, set_total(dec!(200))).await.unwrap();
            let last = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();

            assert_eq!(amounts(&mid), vec![usd(dec!(150)), usd(dec!(100))]);
            assert_eq!(amounts(&last), vec![usd(dec!(120)), usd(dec!(80))]);
            assert_eq!(last.bill.total_amount, usd(dec!(200)));
        }

        #[tokio::test]
        async fn test_regenerating_twice_yields_the_same_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(33.335), dec!(66.665)]).await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(100)))
                .await
                .unwrap();
            svc.update_bill(
                fx.owner,
                bill.id,
                BillUpdate {
                    total_amount: Some(usd(dec!(33.33))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            let updated = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();

            let first = svc.regenerate_charges(fx.owner, bill.id).await.unwrap();
            let after_first = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();
            let second = svc.regenerate_charges(fx.owner, bill.id).await.unwrap();
            let after_second = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();

            let charged = |v: &[TenantUtilityCharge]| -> Vec<(String, Money)> {
                let mut lines: Vec<_> = v.iter().map(|c| (c.tenant_name.clone(), c.charged_amount)).collect();
                lines.sort_by(|a, b| a.0.cmp(&b.0));
                lines
            };
            assert_eq!(first.len(), 2);
            assert_eq!(second.len(), first.len());
            assert_eq!(charged(&first), charged(&second));
            assert_eq!(
                charged(&second),
                vec![
                    ("Alice".to_string(), usd(dec!(11.11))),
                    ("Bob".to_string(), usd(dec!(22.22))),
                ]
            );
            assert_eq!(amounts(&updated), amounts(&after_first));
            assert_eq!(amounts(&after_first), amounts(&after_second));
            assert!(!after_second.bill.is_paid);
        }

        #[tokio::test]
        async fn test_due_date_change_is_copied_to_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Water, &[dec!(50), dec!(50)]).await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Water, "2024-03", dec!(90)))
                .await
                .unwrap();
            let before = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();

            svc.update_bill(
                fx.owner,
                bill.id,
                BillUpdate {
                    due_date: Some(date(2024, 4, 2)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            let after = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap();
            assert_eq!(after.bill.due_date, date(2024, 4, 2));
            assert!(after.charges.iter().all(|c| c.charge.due_date == date(2024, 4, 2)));
            let ids = |v: &BillWithCharges| -> Vec<_> { v.charges.iter().map(|c| c.charge.id).collect() };
            assert_eq!(ids(&before), ids(&after));
        }

        #[tokio::test]
        async fn test_month_change_checks_duplicates() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            svc.add_bill(fx.owner, fx.bill(UtilityType::Gas, "2024-02", dec!(40)))
                .await
                .unwrap();
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Gas, "2024-03", dec!(40)))
                .await
                .unwrap();

            let err = svc
                .update_bill(
                    fx.owner,
                    bill.id,
                    BillUpdate {
                        billing_month: Some("2024-02".parse().unwrap()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Duplicate);
        }

        #[tokio::test]
        async fn test_recompute_blocked_once_charge_is_paid() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(50), dec!(50)]).await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(100)))
                .await
                .unwrap();

            let mut charge = fx.store.charges_for_bill(bill.id).await.unwrap().remove(0);
            charge.is_paid = true;
            fx.store
                .apply_ledger_write(LedgerWrite {
                    entry: None,
                    charge,
                    settled_on: date(2024, 3, 15),
                    updated_at: fx.clock.now(),
                })
                .await
                .unwrap();

            let update = BillUpdate {
                total_amount: Some(usd(dec!(150))),
                ..Default::default()
            };
            let err = svc.update_bill(fx.owner, bill.id, update).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict);
            let err = svc.delete_bill(fx.owner, bill.id).await.unwrap_err();
            assert!(matches!(err, BillingError::RecomputeBlocked { entries: 1, .. }));
        }

        #[tokio::test]
        async fn test_regenerate_after_fixing_allocations() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Internet, "2024-03", dec!(60)))
                .await
                .unwrap();
            assert!(fx.store.charges_for_bill(bill.id).await.unwrap().is_empty());

            fx.split(UtilityType::Internet, &[dec!(50)]).await;
            let charges = svc.regenerate_charges(fx.owner, bill.id).await.unwrap();
            assert_eq!(charges.len(), 1);
            assert_eq!(charges[0].charged_amount, usd(dec!(30)));
        }

        #[tokio::test]
        async fn test_delete_cascades_to_charges() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(50), dec!(50)]).await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Electric, "2024-03", dec!(100)))
                .await
                .unwrap();

            svc.delete_bill(fx.owner, bill.id).await.unwrap();
            assert!(fx.store.charges_for_bill(bill.id).await.unwrap().is_empty());
            let err = svc.get_bill_with_charges(fx.owner, bill.id).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }

        #[tokio::test]
        async fn test_mark_owner_paid_defaults_to_today() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            let bill = svc
                .add_bill(fx.owner, fx.bill(UtilityType::Trash, "2024-03", dec!(25)))
                .await
                .unwrap();

            let paid = svc.mark_owner_paid(fx.owner, bill.id, true, None).await.unwrap();
            assert_eq!(paid.owner_paid_date, Some(date(2024, 3, 15)));
            assert!(svc.list_unpaid_bills(fx.owner, None).await.unwrap().is_empty());

            let unpaid = svc.mark_owner_paid(fx.owner, bill.id, false, None).await.unwrap();
            assert!(unpaid.owner_paid_date.is_none());
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    mod query_tests {
        use super::*;

        #[tokio::test]
        async fn test_bills_by_month_range_groups_and_totals() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            for (t, m, a) in [
                (UtilityType::Water, "2024-01", dec!(100)),
                (UtilityType::Gas, "2024-01", dec!(50)),
                (UtilityType::Water, "2024-02", dec!(110)),
                (UtilityType::Water, "2024-05", dec!(90)),
            ] {
                svc.add_bill(fx.owner, fx.bill(t, m, a)).await.unwrap();
            }

            let months = svc
                .bills_by_month_range(
                    fx.owner,
                    fx.property.id,
                    "2024-01".parse().unwrap(),
                    "2024-03".parse().unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(months.len(), 2);
            assert_eq!(months[0].billing_month.to_string(), "2024-01");
            assert_eq!(months[0].total_amount, usd(dec!(150)));
            assert_eq!(months[0].bill_count, 2);
            assert_eq!(months[0].by_type[&UtilityType::Gas], usd(dec!(50)));
            assert_eq!(months[1].total_amount, usd(dec!(110)));
        }

        #[tokio::test]
        async fn test_unpaid_bills_sorted_by_due_date() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            svc.add_bill(fx.owner, fx.bill(UtilityType::Water, "2024-02", dec!(10)))
                .await
                .unwrap();
            svc.add_bill(fx.owner, fx.bill(UtilityType::Water, "2024-01", dec!(10)))
                .await
                .unwrap();

            let unpaid = svc.list_unpaid_bills(fx.owner, Some(fx.property.id)).await.unwrap();
            assert_eq!(unpaid.len(), 2);
            assert_eq!(unpaid[0].bill.billing_month.to_string(), "2024-01");
            assert_eq!(unpaid[0].property_name, "Maple Court");
        }

        #[tokio::test]
        async fn test_list_bills_filters() {
            let fx = Fixture::new().await;
            let svc = service(&fx);
            svc.add_bill(fx.owner, fx.bill(UtilityType::Water, "2024-01", dec!(10)))
                .await
                .unwrap();
            svc.add_bill(fx.owner, fx.bill(UtilityType::Gas, "2024-02", dec!(10)))
                .await
                .unwrap();

            let filter = BillFilter {
                utility_type: Some(UtilityType::Gas),
                ..Default::default()
            };
            let bills = svc.list_bills(fx.owner, filter).await.unwrap();
            assert_eq!(bills.len(), 1);
            assert!(svc.list_bills(UserId::new(), BillFilter::default()).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_preview_split() {
            let fx = Fixture::new().await;
            fx.split(UtilityType::Electric, &[dec!(60), dec!(40)]).await;
            let svc = service(&fx);
            let preview = svc
                .preview_split(fx.owner, fx.property.id, UtilityType::Electric, usd(dec!(300)))
                .await
                .unwrap();
            assert!(preview.is_valid);
            assert_eq!(preview.message, "All leases have utility settings configured");
            assert_eq!(preview.lines[0].amount, usd(dec!(180)));
        }
    }
}
