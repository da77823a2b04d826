//! Tests for tenancy and allocation value types

use chrono::NaiveDate;
use core_kernel::{PropertyId, UnitId, UserId};
use domain_allocation::{AllocationError, Lease, LeaseStatus, Property, UtilityType};

mod tenancy_tests {
    use super::*;

    #[test]
    fn test_new_lease_is_active() {
        let lease = Lease::new(PropertyId::new(), "Dana", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(lease.is_active());
        assert!(!lease.clone().with_status(LeaseStatus::Terminated).is_active());
    }

    #[test]
    fn test_display_key_orders_by_unit_then_name() {
        let property = PropertyId::new();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut leases = vec![
            Lease::new(property, "Zed", start).with_unit(UnitId::new(), "1A"),
            Lease::new(property, "Amy", start).with_unit(UnitId::new(), "2B"),
            Lease::new(property, "Bea", start).with_unit(UnitId::new(), "1A"),
        ];
        leases.sort_by_key(Lease::display_key);
        let names: Vec<&str> = leases.iter().map(|l| l.tenant_name.as_str()).collect();
        assert_eq!(names, vec!["Bea", "Zed", "Amy"]);
    }

    #[test]
    fn test_ownership() {
        let owner = UserId::new();
        let property = Property::new(owner, "Elm House");
        assert!(property.is_owned_by(owner));
        assert!(!property.is_owned_by(UserId::new()));
    }

    #[test]
    fn test_lease_status_round_trip() {
        for status in [LeaseStatus::Pending, LeaseStatus::Active, LeaseStatus::Expired, LeaseStatus::Terminated] {
            assert_eq!(status.as_str().parse::<LeaseStatus>().unwrap(), status);
        }
        assert!(matches!("evicted".parse::<LeaseStatus>(), Err(AllocationError::Validation(_))));
    }
}

mod utility_type_tests {
    use super::*;

    #[test]
    fn test_all_types_parse_from_display() {
        for t in UtilityType::ALL {
            assert_eq!(t.to_string().parse::<UtilityType>().unwrap(), t);
        }
    }
}
