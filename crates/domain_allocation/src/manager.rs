//! Allocation manager
//!
//! Validates and persists responsibility splits. Every write re-checks the
//! invariant that, for one property and utility type, the active leases'
//! shares total at most 100%. The remainder is the owner's share.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{LeaseId, PropertyId, UserId};

use crate::error::AllocationError;
use crate::ports::{AllocationStore, AllocationStoreExt};
use crate::setting::{
    ensure_within_limit, parse_share, total_for, AllocationSetting, AllocationSummary,
    IncompleteAllocation, LeaseAllocation, LeaseShare, UtilityShare,
};
use crate::tenancy::{Lease, Property};
use crate::utility::UtilityType;

/// Service owning all writes to responsibility settings
pub struct AllocationManager<S: AllocationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: AllocationStore + ?Sized> Clone for AllocationManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AllocationStore + ?Sized> AllocationManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Loads a property and checks that `user` owns it
    pub async fn owned_property(&self, user: UserId, property_id: PropertyId) -> Result<Property, AllocationError> {
        let property = self.store.get_property(property_id).await?;
        if !property.is_owned_by(user) {
            return Err(AllocationError::permission_denied(property_id));
        }
        Ok(property)
    }

    /// Loads a lease and checks that `user` owns its property
    pub async fn owned_lease(&self, user: UserId, lease_id: LeaseId) -> Result<Lease, AllocationError> {
        let lease = self.store.get_lease(lease_id).await?;
        self.owned_property(user, lease.property_id).await?;
        Ok(lease)
    }

    /// Replaces the split of one utility type across a property's active leases
    ///
    /// Every listed lease must be active on the property and appear once.
    /// Zero shares are dropped, since no setting already means 0%.
    #[instrument(skip(self, shares), fields(shares = shares.len()))]
    pub async fn replace_property_allocations(
        &self,
        user: UserId,
        property_id: PropertyId,
        utility_type: UtilityType,
        shares: Vec<LeaseShare>,
    ) -> Result<Vec<AllocationSetting>, AllocationError> {
        self.owned_property(user, property_id).await?;
        let active: HashSet<LeaseId> = self
            .store
            .active_leases(property_id)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();

        let mut seen = HashSet::new();
        let mut settings = Vec::with_capacity(shares.len());
        let mut total = Decimal::ZERO;
        for share in shares {
            if !active.contains(&share.lease_id) {
                return Err(AllocationError::validation(format!(
                    "Lease {} is not an active lease of property {}",
                    share.lease_id, property_id
                )));
            }
            if !seen.insert(share.lease_id) {
                return Err(AllocationError::validation(format!(
                    "Lease {} appears more than once",
                    share.lease_id
                )));
            }
            let percentage = parse_share(share.percentage, share.lease_id)?;
            total += percentage.value();
            if !percentage.is_zero() {
                settings.push(AllocationSetting::new(share.lease_id, utility_type, percentage));
            }
        }

        if let Err(e) = ensure_within_limit(utility_type, total) {
            warn!(%property_id, %utility_type, %total, "Rejected allocation above 100%");
            return Err(e);
        }

        self.store
            .replace_property_allocations(property_id, utility_type, settings.clone())
            .await?;
        info!(%property_id, %utility_type, %total, "Replaced property allocations");
        Ok(settings)
    }

    /// Replaces every setting held by one lease
    ///
    /// Each utility type is checked against the shares already held by the
    /// property's other active leases.
    #[instrument(skip(self, shares), fields(shares = shares.len()))]
    pub async fn set_lease_allocations(
        &self,
        user: UserId,
        lease_id: LeaseId,
        shares: Vec<UtilityShare>,
    ) -> Result<Vec<AllocationSetting>, AllocationError> {
        let lease = self.owned_lease(user, lease_id).await?;

        let mut requested: BTreeMap<UtilityType, Decimal> = BTreeMap::new();
        for share in shares {
            let percentage = parse_share(share.percentage, share.utility_type)?;
            if requested.insert(share.utility_type, percentage.value()).is_some() {
                return Err(AllocationError::validation(format!(
                    "{} appears more than once",
                    share.utility_type
                )));
            }
        }

        let others: HashSet<LeaseId> = self
            .store
            .active_leases(lease.property_id)
            .await?
            .into_iter()
            .map(|l| l.id)
            .filter(|id| *id != lease_id)
            .collect();
        let existing = self.store.allocations_for_property(lease.property_id).await?;

        let mut settings = Vec::new();
        for (utility_type, pct) in requested {
            let total = total_for(&existing, utility_type, &others) + pct;
            if let Err(e) = ensure_within_limit(utility_type, total) {
                warn!(%lease_id, %utility_type, %total, "Rejected lease allocation above 100%");
                return Err(e);
            }
            if !pct.is_zero() {
                settings.push(AllocationSetting::new(lease_id, utility_type, parse_share(pct, utility_type)?));
            }
        }

        self.store.replace_lease_allocations(lease_id, settings.clone()).await?;
        info!(%lease_id, count = settings.len(), "Replaced lease allocations");
        Ok(settings)
    }

    /// Copies one lease's settings onto another, replacing the target's
    #[instrument(skip(self))]
    pub async fn copy_lease_allocations(
        &self,
        user: UserId,
        from: LeaseId,
        to: LeaseId,
    ) -> Result<Vec<AllocationSetting>, AllocationError> {
        self.owned_lease(user, from).await?;
        let source = self.store.allocations_for_lease(from).await?;
        if source.is_empty() {
            return Err(AllocationError::validation("No utility settings found in source lease"));
        }
        let shares = source
            .into_iter()
            .map(|s| UtilityShare {
                utility_type: s.utility_type,
                percentage: s.percentage.value(),
            })
            .collect();
        self.set_lease_allocations(user, to, shares).await
    }

    /// Lists the settings held by one lease, sorted by utility type
    pub async fn lease_allocations(
        &self,
        user: UserId,
        lease_id: LeaseId,
    ) -> Result<Vec<AllocationSetting>, AllocationError> {
        self.owned_lease(user, lease_id).await?;
        let mut settings = self.store.allocations_for_lease(lease_id).await?;
        settings.sort_by_key(|s| s.utility_type);
        Ok(settings)
    }

    /// Reports tenant and owner shares of one utility type on a property
    pub async fn property_summary(
        &self,
        user: UserId,
        property_id: PropertyId,
        utility_type: UtilityType,
    ) -> Result<AllocationSummary, AllocationError> {
        self.owned_property(user, property_id).await?;
        let mut leases = self.store.active_leases(property_id).await?;
        leases.sort_by_key(Lease::display_key);
        let settings = self.store.allocations_for_property(property_id).await?;

        let lines: Vec<LeaseAllocation> = leases
            .iter()
            .map(|lease| LeaseAllocation {
                lease_id: lease.id,
                tenant_name: lease.tenant_name.clone(),
                unit_label: lease.unit_label.clone(),
                percentage: settings
                    .iter()
                    .find(|s| s.lease_id == lease.id && s.utility_type == utility_type)
                    .map_or(Decimal::ZERO, |s| s.percentage.value()),
            })
            .collect();
        let total: Decimal = lines.iter().map(|l| l.percentage).sum();

        Ok(AllocationSummary {
            property_id,
            utility_type,
            total_percentage: total,
            owner_percentage: core_kernel::Percentage::remainder_of(total),
            is_valid: total <= Decimal::ONE_HUNDRED,
            is_complete: total == Decimal::ONE_HUNDRED,
            leases: lines,
        })
    }

    /// Lists, across the caller's properties, utility types whose tenant shares
    /// are set but do not total exactly 100%
    pub async fn incomplete_allocations(&self, user: UserId) -> Result<Vec<IncompleteAllocation>, AllocationError> {
        let mut properties = self.store.properties_for_owner(user).await?;
        properties.sort_by(|a, b| a.name.cmp(&b.name));

        let mut incomplete = Vec::new();
        for property in properties {
            let active: HashSet<LeaseId> = self
                .store
                .active_leases(property.id)
                .await?
                .into_iter()
                .map(|l| l.id)
                .collect();
            if active.is_empty() {
                continue;
            }
            let settings = self.store.allocations_for_property(property.id).await?;
            for utility_type in UtilityType::ALL {
                let total = total_for(&settings, utility_type, &active);
                if total > Decimal::ZERO && total != Decimal::ONE_HUNDRED {
                    incomplete.push(IncompleteAllocation {
                        property_id: property.id,
                        property_name: property.name.clone(),
                        utility_type,
                        total_percentage: total,
                        owner_percentage: core_kernel::Percentage::remainder_of(total),
                    });
                }
            }
        }
        Ok(incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockAllocationStore;
    use crate::tenancy::LeaseStatus;
    use chrono::NaiveDate;
    use core_kernel::Percentage;
    use rust_decimal_macros::dec;

    struct Setup {
        store: Arc<MockAllocationStore>,
        manager: AllocationManager<MockAllocationStore>,
        owner: UserId,
        property: Property,
        lease_a: Lease,
        lease_b: Lease,
    }

    async fn setup() -> Setup {
        let store = Arc::new(MockAllocationStore::new());
        let owner = UserId::new();
        let property = Property::new(owner, "Maple Court");
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let lease_a = Lease::new(property.id, "Alice", start);
        let lease_b = Lease::new(property.id, "Bob", start);
        store.add_property(property.clone()).await;
        store.add_lease(lease_a.clone()).await;
        store.add_lease(lease_b.clone()).await;
        Setup {
            manager: AllocationManager::new(Arc::clone(&store)),
            store,
            owner,
            property,
            lease_a,
            lease_b,
        }
    }

    fn share(lease: &Lease, pct: Decimal) -> LeaseShare {
        LeaseShare {
            lease_id: lease.id,
            percentage: pct,
        }
    }

    // ========================================================================
    // Property-wide replacement
    // ========================================================================

    mod replace_tests {
        use super::*;

        #[tokio::test]
        async fn test_accepts_split_up_to_one_hundred() {
            let s = setup().await;
            let saved = s
                .manager
                .replace_property_allocations(
                    s.owner,
                    s.property.id,
                    UtilityType::Electric,
                    vec![share(&s.lease_a, dec!(60)), share(&s.lease_b, dec!(40))],
                )
                .await
                .unwrap();
            assert_eq!(saved.len(), 2);

            let summary = s
                .manager
                .property_summary(s.owner, s.property.id, UtilityType::Electric)
                .await
                .unwrap();
            assert_eq!(summary.total_percentage, dec!(100));
            assert_eq!(summary.owner_percentage, dec!(0));
            assert!(summary.is_complete);
        }

        #[tokio::test]
        async fn test_rejects_split_over_one_hundred_without_writing() {
            let s = setup().await;
            let err = s
                .manager
                .replace_property_allocations(
                    s.owner,
                    s.property.id,
                    UtilityType::Water,
                    vec![share(&s.lease_a, dec!(70)), share(&s.lease_b, dec!(50))],
                )
                .await
                .unwrap_err();
            match err {
                AllocationError::AllocationExceeded { utility_type, total } => {
                    assert_eq!(utility_type, UtilityType::Water);
                    assert_eq!(total, dec!(120));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(s.store.allocations_for_property(s.property.id).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_rejects_out_of_range_percentage() {
            let s = setup().await;
            let err = s
                .manager
                .replace_property_allocations(
                    s.owner,
                    s.property.id,
                    UtilityType::Gas,
                    vec![share(&s.lease_a, dec!(150))],
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AllocationError::Validation(_)));
        }

        #[tokio::test]
        async fn test_rejects_inactive_lease() {
            let s = setup().await;
            let old = Lease::new(s.property.id, "Carol", NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
                .with_status(LeaseStatus::Expired);
            s.store.add_lease(old.clone()).await;
            let err = s
                .manager
                .replace_property_allocations(s.owner, s.property.id, UtilityType::Gas, vec![share(&old, dec!(10))])
                .await
                .unwrap_err();
            assert!(matches!(err, AllocationError::Validation(_)));
        }

        #[tokio::test]
        async fn test_other_owner_is_denied() {
            let s = setup().await;
            let err = s
                .manager
                .replace_property_allocations(UserId::new(), s.property.id, UtilityType::Gas, vec![])
                .await
                .unwrap_err();
            assert!(matches!(err, AllocationError::PermissionDenied(_)));
        }

        #[tokio::test]
        async fn test_replace_leaves_other_utility_types_alone() {
            let s = setup().await;
            s.manager
                .replace_property_allocations(s.owner, s.property.id, UtilityType::Water, vec![share(&s.lease_a, dec!(50))])
                .await
                .unwrap();
            s.manager
                .replace_property_allocations(s.owner, s.property.id, UtilityType::Gas, vec![share(&s.lease_b, dec!(30))])
                .await
                .unwrap();
            s.manager
                .replace_property_allocations(s.owner, s.property.id, UtilityType::Gas, vec![share(&s.lease_a, dec!(20))])
                .await
                .unwrap();

            let all = s.store.allocations_for_property(s.property.id).await.unwrap();
            assert_eq!(all.len(), 2);
            assert!(all.iter().any(|x| x.utility_type == UtilityType::Water));
            assert!(all.iter().all(|x| x.lease_id == s.lease_a.id));
        }
    }

    // ========================================================================
    // Lease-level settings
    // ========================================================================

    mod lease_tests {
        use super::*;

        #[tokio::test]
        async fn test_lease_share_checked_against_siblings() {
            let s = setup().await;
            s.store
                .add_setting(AllocationSetting::new(
                    s.lease_b.id,
                    UtilityType::Electric,
                    Percentage::new(dec!(70)).unwrap(),
                ))
                .await;

            let err = s
                .manager
                .set_lease_allocations(
                    s.owner,
                    s.lease_a.id,
                    vec![UtilityShare { utility_type: UtilityType::Electric, percentage: dec!(50) }],
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AllocationError::AllocationExceeded { .. }));

            let ok = s
                .manager
                .set_lease_allocations(
                    s.owner,
                    s.lease_a.id,
                    vec![UtilityShare { utility_type: UtilityType::Electric, percentage: dec!(30) }],
                )
                .await
                .unwrap();
            assert_eq!(ok.len(), 1);
        }

        #[tokio::test]
        async fn test_copy_requires_source_settings() {
            let s = setup().await;
            let err = s
                .manager
                .copy_lease_allocations(s.owner, s.lease_a.id, s.lease_b.id)
                .await
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "Validation error: No utility settings found in source lease"
            );
        }

        #[tokio::test]
        async fn test_copy_replicates_settings() {
            let s = setup().await;
            s.manager
                .set_lease_allocations(
                    s.owner,
                    s.lease_a.id,
                    vec![
                        UtilityShare { utility_type: UtilityType::Water, percentage: dec!(40) },
                        UtilityShare { utility_type: UtilityType::Trash, percentage: dec!(50) },
                    ],
                )
                .await
                .unwrap();
            let copied = s
                .manager
                .copy_lease_allocations(s.owner, s.lease_a.id, s.lease_b.id)
                .await
                .unwrap();
            assert_eq!(copied.len(), 2);
            let target = s.manager.lease_allocations(s.owner, s.lease_b.id).await.unwrap();
            assert_eq!(target[0].utility_type, UtilityType::Trash);
            assert_eq!(target[1].utility_type, UtilityType::Water);
        }
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    mod report_tests {
        use super::*;

        #[tokio::test]
        async fn test_incomplete_allocations_flags_partial_totals() {
            let s = setup().await;
            s.manager
                .replace_property_allocations(s.owner, s.property.id, UtilityType::Electric, vec![share(&s.lease_a, dec!(60))])
                .await
                .unwrap();
            s.manager
                .replace_property_allocations(
                    s.owner,
                    s.property.id,
                    UtilityType::Water,
                    vec![share(&s.lease_a, dec!(50)), share(&s.lease_b, dec!(50))],
                )
                .await
                .unwrap();

            let incomplete = s.manager.incomplete_allocations(s.owner).await.unwrap();
            assert_eq!(incomplete.len(), 1);
            assert_eq!(incomplete[0].utility_type, UtilityType::Electric);
            assert_eq!(incomplete[0].owner_percentage, dec!(40));
        }
    }
}
