//! Property tests for bill splitting over the in-memory store

use proptest::prelude::*;

use domain_allocation::UtilityType;
use test_utils::{
    assert_charges_within, billing_month_strategy, split_strategy, usd_money_strategy, BillBuilder, Landlord,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_charges_stay_within_rounding_of_the_bill(
        shares in split_strategy(3),
        total in usd_money_strategy(),
        month in billing_month_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let landlord = Landlord::with_leases(&["Ann", "Ben", "Cat"]).await;
            landlord.split(UtilityType::Gas, &shares).await;

            let bills = landlord.bills();
            let bill = bills
                .add_bill(
                    landlord.owner,
                    BillBuilder::new(landlord.property.id, UtilityType::Gas)
                        .month(&month.to_string())
                        .amount(total.amount())
                        .build(),
                )
                .await
                .unwrap();

            let detail = bills.get_bill_with_charges(landlord.owner, bill.id).await.unwrap();
            let charges: Vec<_> = detail.charges.into_iter().map(|c| c.charge).collect();
            assert_charges_within(&charges, &total);
        });
    }
}
