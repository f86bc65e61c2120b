//! Shared symbol → record map for one run.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use super::mapping::fill_derived;
use crate::models::QuoteRecord;

#[derive(Debug, Default)]
struct BookState {
    records: HashMap<String, QuoteRecord>,
    /// The upstream said the instrument does not exist.
    not_found: HashSet<String>,
    /// Removed by the quote-type filter.
    non_equity: HashSet<String>,
    /// Every tier call made for it returned an answer, even an empty one.
    finished: HashSet<String>,
}

/// Final state of a [`QuoteBook`].
#[derive(Clone, Debug, Default)]
pub struct BookResult {
    /// Accepted records, keyed by symbol.
    pub records: BTreeMap<String, QuoteRecord>,
    pub non_equity: BTreeSet<String>,
    /// Symbols with no data that were either reported missing or got an
    /// answer from every tier.
    pub denylist_candidates: BTreeSet<String>,
    pub volume_substitutions: usize,
}

/// The accumulating record map shared by every worker.
///
/// All read-modify-write happens under one mutex. Merges only ever fill null
/// fields, so the final content does not depend on worker interleaving.
#[derive(Debug, Default)]
pub struct QuoteBook {
    state: Mutex<BookState>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Quote book mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Merge a tier result for `symbol`. Ignored once the symbol was filtered out.
    ///
    /// Derived fields are recomputed on the merged record, so a price from one
    /// tier and shares outstanding from another still yield a market cap.
    pub fn merge(&self, record: QuoteRecord) {
        let mut state = self.lock_state();
        if state.non_equity.contains(&record.symbol) {
            return;
        }
        match state.records.get_mut(&record.symbol) {
            Some(existing) => {
                existing.merge(record);
                fill_derived(existing);
            }
            None => {
                state.records.insert(record.symbol.clone(), record);
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<QuoteRecord> {
        self.lock_state().records.get(symbol).cloned()
    }

    pub fn is_complete(&self, symbol: &str) -> bool {
        self.lock_state()
            .records
            .get(symbol)
            .map(QuoteRecord::is_complete)
            .unwrap_or(false)
    }

    /// Complete, filtered out, or known not to exist: no more work for this run.
    pub fn is_settled(&self, symbol: &str) -> bool {
        let state = self.lock_state();
        state.non_equity.contains(symbol)
            || state.not_found.contains(symbol)
            || state
                .records
                .get(symbol)
                .map(QuoteRecord::is_complete)
                .unwrap_or(false)
    }

    /// Price or volume still missing.
    pub fn needs_price_or_volume(&self, symbol: &str) -> bool {
        self.lock_state()
            .records
            .get(symbol)
            .map(QuoteRecord::needs_price_or_volume)
            .unwrap_or(true)
    }

    pub fn mark_non_equity(&self, symbol: &str, quote_type: Option<&str>) {
        let mut state = self.lock_state();
        if state.non_equity.insert(symbol.to_string()) {
            debug!("Dropping {} (quote type {:?})", symbol, quote_type);
        }
        state.records.remove(symbol);
    }

    pub fn mark_not_found(&self, symbol: &str) {
        self.lock_state().not_found.insert(symbol.to_string());
    }

    pub fn mark_finished(&self, symbol: &str) {
        self.lock_state().finished.insert(symbol.to_string());
    }

    pub fn complete_count(&self) -> usize {
        self.lock_state()
            .records
            .values()
            .filter(|r| r.is_complete())
            .count()
    }

    /// Consume the book into the accepted result set.
    ///
    /// With `substitute_average_volume`, a record missing live volume takes its
    /// average volume and is flagged. With `require_complete`, incomplete
    /// records are dropped. Records with no numeric data are never accepted.
    pub fn into_result(self, substitute_average_volume: bool, require_complete: bool) -> BookResult {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut result = BookResult {
            non_equity: state.non_equity.iter().cloned().collect(),
            ..Default::default()
        };

        let data_less = |symbol: &String| {
            state
                .records
                .get(symbol)
                .map(|r| !r.has_any_data())
                .unwrap_or(true)
        };
        result.denylist_candidates = state
            .not_found
            .iter()
            .chain(state.finished.iter())
            .filter(|s| !state.non_equity.contains(*s))
            .filter(|s| data_less(*s))
            .cloned()
            .collect();

        for (symbol, mut record) in state.records {
            if !record.has_any_data() {
                continue;
            }
            if substitute_average_volume && record.volume.is_none() {
                if let Some(avg) = record.average_volume {
                    record.volume = Some(avg);
                    record.volume_substituted = true;
                    result.volume_substitutions += 1;
                }
            }
            if require_complete && !record.is_complete() {
                continue;
            }
            result.records.insert(symbol, record);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(symbol: &str) -> QuoteRecord {
        QuoteRecord::new(symbol)
    }

    #[test]
    fn test_merge_accumulates() {
        let book = QuoteBook::new();
        let mut first = record("BBB");
        first.price = Some(dec!(12.5));
        first.volume = Some(dec!(100));
        book.merge(first);
        assert!(!book.is_complete("BBB"));

        let mut second = record("BBB");
        second.market_cap = Some(dec!(1000000));
        second.price = Some(dec!(99));
        book.merge(second);

        let merged = book.get("BBB").unwrap();
        assert!(merged.is_complete());
        assert_eq!(merged.price, Some(dec!(12.5)));
        assert!(book.is_settled("BBB"));
    }

    #[test]
    fn test_merge_derives_across_tiers() {
        use crate::pipeline::mapping::{map_bulk, map_summary};
        use crate::provider::{RawIdentity, RawQuote, RawSummary};

        let identity = RawIdentity {
            symbol: "GGG".to_string(),
            quote_type: Some("EQUITY".to_string()),
            ..Default::default()
        };
        let bulk = map_bulk(
            "GGG",
            &RawQuote {
                identity: identity.clone(),
                price: Some(10.0),
                volume: Some(100.0),
                ..Default::default()
            },
        );
        let summary = map_summary(
            "GGG",
            &RawSummary {
                identity,
                shares_outstanding: Some(1000.0),
                previous_close: Some(8.0),
                eps: Some(2.0),
                ..Default::default()
            },
        );

        let book = QuoteBook::new();
        book.merge(bulk);
        assert!(!book.is_complete("GGG"));
        book.merge(summary.clone());

        let merged = book.get("GGG").unwrap();
        assert_eq!(merged.market_cap, Some(dec!(10000)));
        assert_eq!(merged.change_percent, Some(dec!(25)));
        assert_eq!(merged.pe_ratio, Some(dec!(5)));
        assert!(merged.is_complete());

        // Merging the same result again changes nothing
        book.merge(summary);
        assert_eq!(book.get("GGG").unwrap(), merged);
    }

    #[test]
    fn test_derived_values_never_overwrite() {
        let book = QuoteBook::new();
        let mut first = record("HHH");
        first.price = Some(dec!(10));
        first.market_cap = Some(dec!(123));
        book.merge(first);

        let mut second = record("HHH");
        second.shares_outstanding = Some(dec!(1000));
        book.merge(second);

        assert_eq!(book.get("HHH").unwrap().market_cap, Some(dec!(123)));
    }

    #[test]
    fn test_non_equity_is_removed_and_stays_out() {
        let book = QuoteBook::new();
        let mut r = record("SPY");
        r.price = Some(dec!(500));
        book.merge(r.clone());
        book.mark_non_equity("SPY", Some("ETF"));
        book.merge(r);

        assert!(book.get("SPY").is_none());
        assert!(book.is_settled("SPY"));

        let result = book.into_result(false, false);
        assert!(result.records.is_empty());
        assert!(result.non_equity.contains("SPY"));
        assert!(result.denylist_candidates.is_empty());
    }

    #[test]
    fn test_denylist_candidates_are_data_less() {
        let book = QuoteBook::new();
        let mut aaa = record("AAA");
        aaa.price = Some(dec!(10));
        book.merge(aaa);
        book.mark_finished("AAA");
        book.mark_finished("CCC");
        book.mark_not_found("ZZZ");
        // DDD never finished (chunk exhausted), so it is not a candidate
        book.merge(record("DDD"));

        let result = book.into_result(false, false);
        let candidates: Vec<_> = result.denylist_candidates.iter().cloned().collect();
        assert_eq!(candidates, vec!["CCC".to_string(), "ZZZ".to_string()]);
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_average_volume_substitution() {
        let book = QuoteBook::new();
        let mut r = record("EEE");
        r.price = Some(dec!(5));
        r.market_cap = Some(dec!(500));
        r.average_volume = Some(dec!(1200));
        book.merge(r);

        let result = book.into_result(true, false);
        let r = &result.records["EEE"];
        assert_eq!(r.volume, Some(dec!(1200)));
        assert!(r.volume_substituted);
        assert!(r.is_complete());
        assert_eq!(result.volume_substitutions, 1);
    }

    #[test]
    fn test_require_complete_drops_partial() {
        let book = QuoteBook::new();
        let mut r = record("FFF");
        r.price = Some(dec!(5));
        book.merge(r);

        assert!(book.into_result(false, true).records.is_empty());
    }
}
