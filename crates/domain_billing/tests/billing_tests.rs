//! Integration tests for domain_billing through its public API

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{BillingMonth, Currency, FixedClock, Money, Percentage, UserId};
use domain_allocation::{AllocationSetting, Lease, Property, UtilityType};
use domain_billing::{
    is_bill_settled, BillService, BillingStore, ErrorKind, InMemoryStore, NewBill, PaymentLedger, PaymentMethod,
    PaymentRequest, ReportFilter, StatementService,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

struct World {
    store: Arc<InMemoryStore>,
    owner: UserId,
    property: Property,
    leases: Vec<Lease>,
    bills: BillService<InMemoryStore>,
    ledger: PaymentLedger<InMemoryStore>,
    statements: StatementService<InMemoryStore>,
}

impl World {
    async fn new(tenants: &[&str]) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::on(date(2024, 3, 28)));
        let owner = UserId::new();
        let property = Property::new(owner, "Oak Street Duplex");
        store.add_property(property.clone()).await;
        let mut leases = Vec::new();
        for name in tenants {
            let lease = Lease::new(property.id, *name, date(2023, 6, 1));
            store.add_lease(lease.clone()).await;
            leases.push(lease);
        }
        Self {
            bills: BillService::new(store.clone(), clock.clone()),
            ledger: PaymentLedger::new(store.clone(), clock.clone()),
            statements: StatementService::new(store.clone(), clock),
            store,
            owner,
            property,
            leases,
        }
    }

    async fn allocate(&self, utility_type: UtilityType, shares: &[Decimal]) {
        for (lease, pct) in self.leases.iter().zip(shares) {
            let setting = AllocationSetting::new(lease.id, utility_type, Percentage::new(*pct).unwrap());
            self.store.add_setting(setting).await;
        }
    }

    fn request(&self, utility_type: UtilityType, month: &str, amount: Decimal) -> NewBill {
        let billing_month: BillingMonth = month.parse().unwrap();
        NewBill {
            property_id: self.property.id,
            utility_type,
            provider: "Metro Utilities".to_string(),
            billing_month,
            total_amount: usd(amount),
            due_date: billing_month.day_offset(20).unwrap(),
            bill_date: billing_month.first_day(),
            notes: None,
            document_id: None,
        }
    }
}

fn payment(charge_id: core_kernel::ChargeId, amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        charge_id,
        amount,
        payment_date: date(2024, 3, 22),
        method: PaymentMethod::Online,
        reference: None,
        notes: None,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_split_then_pay_down_to_settlement() {
        let w = World::new(&["Ana", "Ben"]).await;
        w.allocate(UtilityType::Electric, &[dec!(60), dec!(40)]).await;

        let bill = w
            .bills
            .add_bill(w.owner, w.request(UtilityType::Electric, "2024-03", dec!(300.00)))
            .await
            .unwrap();
        let view = w.bills.get_bill_with_charges(w.owner, bill.id).await.unwrap();
        let a = view.charges[0].charge.clone();
        let b = view.charges[1].charge.clone();
        assert_eq!(a.charged_amount, usd(dec!(180.00)));
        assert_eq!(b.charged_amount, usd(dec!(120.00)));
        assert!(view.owner_share.is_zero());

        let r1 = w.ledger.record_payment(w.owner, payment(a.id, dec!(100.00))).await.unwrap();
        assert_eq!(r1.remaining_balance, usd(dec!(80.00)));
        assert!(!r1.is_fully_paid && !r1.all_charges_paid_on_bill);

        let r2 = w.ledger.record_payment(w.owner, payment(a.id, dec!(80.00))).await.unwrap();
        assert!(r2.remaining_balance.is_zero());
        assert!(r2.is_fully_paid);
        assert!(!r2.all_charges_paid_on_bill);
        assert!(!w.store.get_bill(bill.id).await.unwrap().is_paid);

        let r3 = w.ledger.record_payment(w.owner, payment(b.id, dec!(120.00))).await.unwrap();
        assert!(r3.all_charges_paid_on_bill);
        let charges = w.store.charges_for_bill(bill.id).await.unwrap();
        assert!(is_bill_settled(&charges));
        assert!(w.store.get_bill(bill.id).await.unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_over_allocation_creates_no_charges() {
        let w = World::new(&["Ana", "Ben"]).await;
        w.allocate(UtilityType::Gas, &[dec!(70), dec!(50)]).await;

        let err = w
            .bills
            .add_bill(w.owner, w.request(UtilityType::Gas, "2024-03", dec!(90)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationExceeded);
        assert!(err.to_string().contains("120%"));
        let outstanding = w
            .statements
            .outstanding_charges(w.owner, ReportFilter::default())
            .await
            .unwrap();
        assert!(outstanding.is_empty());
    }

    #[tokio::test]
    async fn test_second_bill_for_same_month_is_rejected() {
        let w = World::new(&["Ana"]).await;
        w.bills
            .add_bill(w.owner, w.request(UtilityType::Electric, "2024-03", dec!(300)))
            .await
            .unwrap();
        let err = w
            .bills
            .add_bill(w.owner, w.request(UtilityType::Electric, "2024-03", dec!(310)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        let bills = w.bills.list_bills(w.owner, Default::default()).await.unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].total_amount, usd(dec!(300)));
    }

    #[tokio::test]
    async fn test_partial_owner_share() {
        let w = World::new(&["Ana", "Ben", "Cy"]).await;
        w.allocate(UtilityType::Water, &[dec!(33.33), dec!(33.33), dec!(0)]).await;
        let bill = w
            .bills
            .add_bill(w.owner, w.request(UtilityType::Water, "2024-03", dec!(100)))
            .await
            .unwrap();
        let view = w.bills.get_bill_with_charges(w.owner, bill.id).await.unwrap();
        assert_eq!(view.charges.len(), 2);
        assert_eq!(view.tenant_percentage, dec!(66.66));
        assert_eq!(view.owner_share, usd(dec!(33.34)));
    }
}

// ============================================================================
// Properties
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn bill_paid_iff_every_charge_paid(marks in proptest::collection::vec(any::<bool>(), 3)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let w = World::new(&["Ana", "Ben", "Cy"]).await;
                w.allocate(UtilityType::Trash, &[dec!(20), dec!(30), dec!(40)]).await;
                let bill = w
                    .bills
                    .add_bill(w.owner, w.request(UtilityType::Trash, "2024-02", dec!(75)))
                    .await
                    .unwrap();
                let mut charges = w.store.charges_for_bill(bill.id).await.unwrap();
                charges.sort_by_key(|c| c.display_key());

                for (charge, paid) in charges.iter().zip(&marks) {
                    w.ledger.mark_paid(w.owner, charge.id, *paid, None).await.unwrap();
                }
                let stored = w.store.get_bill(bill.id).await.unwrap();
                assert_eq!(stored.is_paid, marks.iter().all(|m| *m));
            });
        }
    }
}
