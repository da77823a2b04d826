//! Allocation Domain Ports
//!
//! The `AllocationStore` trait is everything the allocation manager and the
//! charge calculator need from persistence: tenancy reads plus the
//! responsibility settings themselves.
//!
//! # Architecture
//!
//! - **Internal Adapter**: PostgreSQL (`infra_db`)
//! - **In-memory Adapter**: `domain_billing::memory`, which also implements the
//!   billing store
//! - **Mock Adapter**: `mock::MockAllocationStore`, allocation-only, for unit tests
//!
//! Replacement methods are atomic: an adapter either applies the full new set
//! of settings or leaves the old set untouched.

use async_trait::async_trait;

use core_kernel::{DomainPort, LeaseId, PortError, PropertyId, UserId};

use crate::setting::AllocationSetting;
use crate::tenancy::{Lease, Property};
use crate::utility::UtilityType;

/// Persistence port for tenancy reads and responsibility settings
#[async_trait]
pub trait AllocationStore: DomainPort {
    // ========================================================================
    // Tenancy reads
    // ========================================================================

    /// Retrieves a property by ID, or `PortError::NotFound`
    async fn get_property(&self, id: PropertyId) -> Result<Property, PortError>;

    /// Lists every property belonging to `owner`
    async fn properties_for_owner(&self, owner: UserId) -> Result<Vec<Property>, PortError>;

    /// Retrieves a lease by ID, or `PortError::NotFound`
    async fn get_lease(&self, id: LeaseId) -> Result<Lease, PortError>;

    /// Lists every lease on a property regardless of status
    async fn leases_for_property(&self, property_id: PropertyId) -> Result<Vec<Lease>, PortError>;

    // ========================================================================
    // Settings
    // ========================================================================

    /// Lists the settings held by one lease
    async fn allocations_for_lease(&self, lease_id: LeaseId) -> Result<Vec<AllocationSetting>, PortError>;

    /// Lists the settings held by every lease on a property
    async fn allocations_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Vec<AllocationSetting>, PortError>;

    /// Replaces all `utility_type` settings of the property's leases with `settings`
    async fn replace_property_allocations(
        &self,
        property_id: PropertyId,
        utility_type: UtilityType,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError>;

    /// Replaces every setting held by one lease with `settings`
    async fn replace_lease_allocations(
        &self,
        lease_id: LeaseId,
        settings: Vec<AllocationSetting>,
    ) -> Result<(), PortError>;
}

/// Extension trait for AllocationStore with convenience methods
#[async_trait]
pub trait AllocationStoreExt: AllocationStore {
    /// Lists the active leases on a property
    async fn active_leases(&self, property_id: PropertyId) -> Result<Vec<Lease>, PortError> {
        let leases = self.leases_for_property(property_id).await?;
        Ok(leases.into_iter().filter(Lease::is_active).collect())
    }

    /// Looks up the setting one lease holds for one utility type
    async fn allocation_for(
        &self,
        lease_id: LeaseId,
        utility_type: UtilityType,
    ) -> Result<Option<AllocationSetting>, PortError> {
        let settings = self.allocations_for_lease(lease_id).await?;
        Ok(settings.into_iter().find(|s| s.utility_type == utility_type))
    }
}

// Blanket implementation for all AllocationStore implementors
impl<T: AllocationStore + ?Sized> AllocationStoreExt for T {}

/// Mock implementation of AllocationStore for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct State {
        properties: HashMap<PropertyId, Property>,
        leases: HashMap<LeaseId, Lease>,
        settings: Vec<AllocationSetting>,
    }

    /// In-memory mock implementation of AllocationStore
    #[derive(Debug, Default, Clone)]
    pub struct MockAllocationStore {
        state: Arc<RwLock<State>>,
    }

    impl MockAllocationStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_property(&self, property: Property) {
            self.state.write().await.properties.insert(property.id, property);
        }

        pub async fn add_lease(&self, lease: Lease) {
            self.state.write().await.leases.insert(lease.id, lease);
        }

        /// Inserts a setting without any validation
        pub async fn add_setting(&self, setting: AllocationSetting) {
            self.state.write().await.settings.push(setting);
        }
    }

    impl DomainPort for MockAllocationStore {}

    #[async_trait]
    impl AllocationStore for MockAllocationStore {
        async fn get_property(&self, id: PropertyId) -> Result<Property, PortError> {
            self.state
                .read()
                .await
                .properties
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Property", id))
        }

        async fn properties_for_owner(&self, owner: UserId) -> Result<Vec<Property>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .properties
                .values()
                .filter(|p| p.owner_id == owner)
                .cloned()
                .collect())
        }

        async fn get_lease(&self, id: LeaseId) -> Result<Lease, PortError> {
            self.state
                .read()
                .await
                .leases
                .get(&id)
                .cloned()
                .ok_or_else(|| PortError::not_found("Lease", id))
        }

        async fn leases_for_property(&self, property_id: PropertyId) -> Result<Vec<Lease>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .leases
                .values()
                .filter(|l| l.property_id == property_id)
                .cloned()
                .collect())
        }

        async fn allocations_for_lease(&self, lease_id: LeaseId) -> Result<Vec<AllocationSetting>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .settings
                .iter()
                .filter(|s| s.lease_id == lease_id)
                .cloned()
                .collect())
        }

        async fn allocations_for_property(
            &self,
            property_id: PropertyId,
        ) -> Result<Vec<AllocationSetting>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .settings
                .iter()
                .filter(|s| {
                    state
                        .leases
                        .get(&s.lease_id)
                        .map_or(false, |l| l.property_id == property_id)
                })
                .cloned()
                .collect())
        }

        async fn replace_property_allocations(
            &self,
            property_id: PropertyId,
            utility_type: UtilityType,
            settings: Vec<AllocationSetting>,
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let State { leases, settings: current, .. } = &mut *state;
            current.retain(|s| {
                s.utility_type != utility_type
                    || leases.get(&s.lease_id).map_or(true, |l| l.property_id != property_id)
            });
            current.extend(settings);
            Ok(())
        }

        async fn replace_lease_allocations(
            &self,
            lease_id: LeaseId,
            settings: Vec<AllocationSetting>,
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            state.settings.retain(|s| s.lease_id != lease_id);
            state.settings.extend(settings);
            Ok(())
        }
    }
}
