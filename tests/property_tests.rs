//! Property-based tests for domain types and catalog invariants.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

mod support;

use proptest::prelude::*;

use yangmods::catalog::parse_catalog;
use yangmods::core::types::{FeatureName, ModuleName, Revision};
use yangmods::engine::Engine;
use yangmods::store::MemoryBackend;

use support::{BASE, FLAGS, OPS, USER};

/// Strategy for valid YANG identifiers.
fn identifier() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_.-]{0,30}".prop_filter("reserved xml prefix", |s| {
        !(s.len() >= 3 && s[..3].eq_ignore_ascii_case("xml"))
    })
}

/// Strategy for calendar dates as revision strings.
fn revision_string() -> impl Strategy<Value = String> {
    (1970i32..2100, 1u32..=12, 1u32..=31).prop_filter_map("must be a calendar date", |(y, m, d)| {
        chrono::NaiveDate::from_ymd_opt(y, m, d).map(|date| date.format("%Y-%m-%d").to_string())
    })
}

proptest! {
    #[test]
    fn module_name_serde_roundtrip(name in identifier()) {
        let module = ModuleName::new(name.as_str()).unwrap();
        let json = serde_json::to_string(&module).unwrap();
        let parsed: ModuleName = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(module, parsed);
    }

    #[test]
    fn identifiers_cannot_start_with_digit_or_dash(
        first in prop::sample::select(vec!['0', '7', '-', '.']),
        rest in identifier(),
    ) {
        let name = format!("{}{}", first, rest);
        prop_assert!(ModuleName::new(name.as_str()).is_err());
        prop_assert!(FeatureName::new(name.as_str()).is_err());
    }

    /// Revision order is date order.
    #[test]
    fn revision_order_matches_dates(a in revision_string(), b in revision_string()) {
        let ra = Revision::new(a.as_str()).unwrap();
        let rb = Revision::new(b.as_str()).unwrap();
        let da = chrono::NaiveDate::parse_from_str(&a, "%Y-%m-%d").unwrap();
        let db = chrono::NaiveDate::parse_from_str(&b, "%Y-%m-%d").unwrap();
        prop_assert_eq!(ra.cmp(&rb), da.cmp(&db));
    }

    /// Duplicate feature requests collapse to first occurrences.
    #[test]
    fn install_features_are_deduplicated(
        picks in prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 0..10)
    ) {
        let features: Vec<FeatureName> = picks.iter().map(|f| FeatureName::new(*f).unwrap()).collect();
        let mut engine = Engine::new(MemoryBackend::initialized());
        engine.schedule_install(FLAGS, &features, None).unwrap();

        let mut expected: Vec<FeatureName> = Vec::new();
        for f in &features {
            if !expected.contains(f) {
                expected.push(f.clone());
            }
        }
        let catalog = engine.catalog().unwrap();
        prop_assert_eq!(&catalog.find_install("flags").unwrap().features, &expected);

        engine.apply_scheduled_changes().unwrap();
        let catalog = engine.catalog().unwrap();
        let entry = catalog.find_module("flags").unwrap();
        let mut sorted = expected.clone();
        sorted.sort();
        prop_assert_eq!(&entry.enabled_features, &sorted);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After any apply, inverse dependencies mirror the forward ones.
    #[test]
    fn inverse_dependencies_mirror_references(
        with_user in any::<bool>(),
        with_ops in any::<bool>(),
        remove_user in any::<bool>(),
    ) {
        let mut engine = Engine::new(MemoryBackend::initialized());
        engine.schedule_install(BASE, &[], None).unwrap();
        if with_user {
            engine.schedule_install(USER, &[], None).unwrap();
        }
        if with_ops {
            engine.schedule_install(OPS, &[], None).unwrap();
        }
        let outcome = engine.apply_scheduled_changes().unwrap();
        prop_assert!(!outcome.failed);

        if with_user && remove_user {
            engine.schedule_remove("user").unwrap();
            let outcome = engine.apply_scheduled_changes().unwrap();
            prop_assert!(!outcome.failed);
        }

        let catalog = engine.catalog().unwrap();
        for m in &catalog.modules {
            for target in m.referenced_modules() {
                if *target == m.name {
                    continue;
                }
                let t = catalog.find_module(target.as_str()).unwrap();
                prop_assert!(t.inverse_deps.contains(&m.name));
            }
            for dependent in &m.inverse_deps {
                let d = catalog.find_module(dependent.as_str()).unwrap();
                prop_assert!(d.referenced_modules().contains(&m.name));
            }
        }

        let expected = usize::from(with_user && !remove_user) + usize::from(with_ops);
        prop_assert_eq!(catalog.find_inverse_dependents("base").len(), expected);

        // The stored form passes the same checks.
        let reparsed = parse_catalog(&catalog.to_json().unwrap()).unwrap();
        prop_assert_eq!(reparsed, catalog);
    }
}
