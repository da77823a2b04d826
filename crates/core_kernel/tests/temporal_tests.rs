//! Tests for billing months, date ranges and clocks

use chrono::NaiveDate;
use core_kernel::temporal::add_months;
use core_kernel::{BillingMonth, Clock, DateRange, FixedClock, TemporalError, Timezone};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod billing_month {
    use super::*;

    #[test]
    fn test_ordering_is_chronological() {
        let mut months: Vec<BillingMonth> = ["2024-02", "2023-12", "2024-01"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        months.sort();
        let rendered: Vec<String> = months.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_of_date() {
        assert_eq!(BillingMonth::of(date(2024, 3, 31)).to_string(), "2024-03");
    }

    #[test]
    fn test_day_offset() {
        let m: BillingMonth = "2024-01".parse().unwrap();
        assert_eq!(m.day_offset(7).unwrap(), date(2024, 1, 8));
    }

    #[test]
    fn test_serde_as_string() {
        let m: BillingMonth = serde_json::from_str("\"2024-03\"").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"2024-03\"");
        assert!(serde_json::from_str::<BillingMonth>("\"2024-3\"").is_err());
    }
}

mod date_range {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 1, 31)));
        assert!(!range.contains(date(2024, 2, 1)));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let result = DateRange::new(date(2024, 2, 1), date(2024, 1, 1));
        assert!(matches!(result, Err(TemporalError::InvalidRange { .. })));
    }

    #[test]
    fn test_add_months_clamps() {
        assert_eq!(add_months(date(2024, 1, 31), 1).unwrap(), date(2024, 2, 29));
    }
}

mod clocks {
    use super::*;

    #[test]
    fn test_fixed_clock_reports_date() {
        let clock = FixedClock::on(date(2024, 2, 1));
        assert_eq!(clock.today(), date(2024, 2, 1));
    }

    #[test]
    fn test_timezone_parse() {
        assert!("Europe/Berlin".parse::<Timezone>().is_ok());
        assert!(matches!(
            "Mars/Olympus".parse::<Timezone>(),
            Err(TemporalError::InvalidTimezone(_))
        ));
    }
}
