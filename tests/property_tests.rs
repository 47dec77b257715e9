/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use bigdecimal::BigDecimal;
use ead_ops::cache::keyspace_total;
use ead_ops::fmt::brl;
use ead_ops::inspect::progress::computed_percentage;
use ead_ops::patch::extended_period;
use ead_ops::smoke::check_shape;
use ead_ops::validate::is_valid_email;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::str::FromStr;

// Property: validators and matchers never panic
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn simple_emails_are_valid(
        local in "[a-z]{1,10}",
        domain in "[a-z]{1,10}",
        tld in "[a-z]{2,4}"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        prop_assert!(is_valid_email(&email));
    }

    #[test]
    fn keyspace_parser_never_panics(info in "\\PC{0,64}") {
        let _ = keyspace_total(&info);
    }

    #[test]
    fn check_shape_never_panics(path in "[a-z\\[\\]0-9.]{0,20}") {
        let value = serde_json::json!({ "a": [{ "b": 1 }], "c": { "d": null } });
        let _ = check_shape(&value, &path);
    }
}

// Property: keyspace totals add up
proptest! {
    #[test]
    fn keyspace_total_sums_db_lines(counts in proptest::collection::vec(0u64..1_000_000, 0..16)) {
        let info: String = counts
            .iter()
            .enumerate()
            .map(|(i, n)| format!("db{}:keys={},expires=0,avg_ttl=0\r\n", i, n))
            .collect();
        let info = format!("# Keyspace\r\n{}", info);
        prop_assert_eq!(keyspace_total(&info), counts.iter().sum::<u64>());
    }
}

// Property: report helpers stay in range
proptest! {
    #[test]
    fn percentage_is_bounded(completed in 0i64..10_000, total in 0i64..10_000) {
        let pct = computed_percentage(completed, total);
        prop_assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn brl_always_has_two_decimals(cents in 0i64..10_000_000_000) {
        let amount = BigDecimal::from_str(&format!("{}.{:02}", cents / 100, cents % 100)).unwrap();
        let text = brl(&amount);
        prop_assert!(text.starts_with("R$ "));
        let decimals = text.rsplit(',').next().unwrap();
        prop_assert_eq!(decimals.len(), 2);
    }

    #[test]
    fn extended_period_never_shrinks(offset_days in -400i64..400, days in 1i32..400) {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let existing = now + Duration::days(offset_days);
        let (start, end) = extended_period(Some(existing), now, days).unwrap();
        prop_assert!(start >= now);
        prop_assert!(start >= existing.min(now));
        prop_assert_eq!((end - start).num_days(), i64::from(days));
    }

    #[test]
    fn extended_period_rejects_non_positive_or_huge_durations(
        days in prop_oneof![i32::MIN..=0, 100_000_000i32..=i32::MAX]
    ) {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        prop_assert!(extended_period(None, now, days).is_err());
    }
}
