//! Property-based tests for merge, completeness, denylist and proxy health.
//!
//! These tests verify that universal properties hold across all valid inputs,
//! using the `proptest` crate for random test case generation.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use quotescan_engine::{
    CoreField, Denylist, ManualClock, ProxyAddr, ProxyHealthConfig, ProxyHealthRegistry,
    QualityEvaluator, QuoteRecord, SymbolBatch,
};
use rust_decimal::Decimal;

// =============================================================================
// Generators
// =============================================================================

fn arb_value() -> impl Strategy<Value = Option<Decimal>> {
    proptest::option::of((0i64..1_000_000).prop_map(|v| Decimal::new(v, 2)))
}

fn arb_record(symbol: String) -> impl Strategy<Value = QuoteRecord> {
    (
        proptest::collection::vec(arb_value(), CoreField::ALL.len()),
        arb_value(),
        proptest::option::of("[A-Z][a-z]{2,10}"),
    )
        .prop_map(move |(values, previous_close, name)| QuoteRecord {
            symbol: symbol.clone(),
            name,
            price: values[0],
            change_percent: values[1],
            volume: values[2],
            average_volume: values[3],
            market_cap: values[4],
            week_52_high: values[5],
            week_52_low: values[6],
            pe_ratio: values[7],
            eps: values[8],
            dividend_yield: values[9],
            previous_close,
            ..Default::default()
        })
}

fn arb_ticker() -> impl Strategy<Value = String> {
    "[A-Z]{1,4}"
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Merging never replaces a populated field, and merging twice is a no-op.
    #[test]
    fn prop_merge_never_overwrites(
        base in arb_record("AAA".to_string()),
        other in arb_record("AAA".to_string()),
    ) {
        let mut merged = base.clone();
        merged.merge(other.clone());

        for field in CoreField::ALL {
            match field.value(&base) {
                Some(v) => prop_assert_eq!(field.value(&merged), Some(v)),
                None => prop_assert_eq!(field.value(&merged), field.value(&other)),
            }
        }
        if base.name.is_some() {
            prop_assert_eq!(&merged.name, &base.name);
        }

        let mut twice = merged.clone();
        twice.merge(other);
        prop_assert_eq!(twice, merged);
    }

    /// The completeness ratio stays in [0, 1] and equals complete / requested.
    #[test]
    fn prop_completeness_ratio_bounds(
        records in proptest::collection::vec(arb_record("X".to_string()), 0..30),
        extra_requested in 0usize..20,
    ) {
        let records: BTreeMap<String, QuoteRecord> = records
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.symbol = format!("S{}", i);
                (r.symbol.clone(), r)
            })
            .collect();
        let requested = records.len() + extra_requested;

        let stats = QualityEvaluator::default().evaluate(&records, requested, Duration::from_secs(1));

        prop_assert!((0.0..=1.0).contains(&stats.completeness_ratio));
        let complete = records.values().filter(|r| r.is_complete()).count();
        if requested == 0 {
            prop_assert_eq!(stats.completeness_ratio, 0.0);
        } else {
            prop_assert!((stats.completeness_ratio - complete as f64 / requested as f64).abs() < 1e-12);
        }
        prop_assert_eq!(stats.complete_count + stats.failed_count, requested);
    }

    /// Exactly the denylisted symbols present in the universe are removed.
    #[test]
    fn prop_denylist_exclusion(
        universe in proptest::collection::vec(arb_ticker(), 0..40),
        denied in proptest::collection::btree_set(arb_ticker(), 0..15),
    ) {
        let mut batch = SymbolBatch::new(&universe);
        let unique: HashSet<String> = batch.symbols().iter().cloned().collect();
        let denylist = Denylist::new(denied.clone());

        let removed = denylist.filter(&mut batch);

        let expected: BTreeSet<&String> = denied.iter().filter(|s| unique.contains(*s)).collect();
        prop_assert_eq!(removed.len(), expected.len());
        prop_assert!(batch.symbols().iter().all(|s| !denied.contains(s)));
        prop_assert_eq!(batch.len() + removed.len(), unique.len());
    }

    /// An identity blocks on reaching the threshold and is only reinstated
    /// once the full cooldown has elapsed since its last failure.
    #[test]
    fn prop_block_and_cooldown(threshold in 1u32..6, cooldown_secs in 2u64..600) {
        let clock = Arc::new(ManualClock::new());
        let registry = ProxyHealthRegistry::with_config(
            [ProxyAddr::from("http://10.0.0.1:8080")],
            ProxyHealthConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(cooldown_secs),
            },
            clock.clone(),
        );
        let id = ProxyAddr::from("http://10.0.0.1:8080");

        for _ in 1..threshold {
            registry.record_failure(&id, "HTTP 429");
            prop_assert!(!registry.is_blocked(&id));
        }
        registry.record_failure(&id, "HTTP 429");
        prop_assert!(registry.is_blocked(&id));

        clock.advance(Duration::from_secs(cooldown_secs - 1));
        prop_assert_eq!(registry.unblock_expired(), 0);
        prop_assert!(registry.is_blocked(&id));

        clock.advance(Duration::from_secs(1));
        prop_assert_eq!(registry.unblock_expired(), 1);
        prop_assert!(!registry.is_blocked(&id));
        prop_assert_eq!(registry.failure_count(&id), 0);
    }
}
