//! Total mapping from raw payloads to [`QuoteRecord`]s.
//!
//! Nothing here fails: absent or unrepresentable values become `None`.

use chrono::{TimeZone, Utc};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;

use crate::models::{FetchTier, QuoteRecord};
use crate::provider::{ProviderPayload, RawHistory, RawIdentity, RawQuote, RawSummary, YieldValue};

/// Decimal places kept on derived ratios.
const DERIVED_DP: u32 = 4;

fn dec(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .map(|d| d.normalize())
}

fn yield_percent(value: Option<YieldValue>) -> Option<Decimal> {
    match value? {
        YieldValue::Percent(p) => dec(Some(p)),
        YieldValue::Fraction(f) => dec(Some(f)).map(|d| (d * Decimal::ONE_HUNDRED).normalize()),
    }
}

/// Day change in percent from the current and previous close.
pub fn derive_change_percent(price: Option<Decimal>, previous_close: Option<Decimal>) -> Option<Decimal> {
    let (price, prev) = (price?, previous_close?);
    if prev.is_zero() {
        return None;
    }
    let change = (price - prev).checked_div(prev)?.checked_mul(Decimal::ONE_HUNDRED)?;
    Some(change.round_dp(DERIVED_DP).normalize())
}

/// Price over earnings; only meaningful for positive earnings.
pub fn derive_pe_ratio(price: Option<Decimal>, eps: Option<Decimal>) -> Option<Decimal> {
    let (price, eps) = (price?, eps?);
    if eps <= Decimal::ZERO {
        return None;
    }
    Some(price.checked_div(eps)?.round_dp(DERIVED_DP).normalize())
}

pub fn derive_market_cap(price: Option<Decimal>, shares: Option<Decimal>) -> Option<Decimal> {
    let product = price?.checked_mul(shares?)?;
    Some(product.round_dp(0).normalize())
}

fn apply_identity(record: &mut QuoteRecord, identity: &RawIdentity) {
    record.name = identity
        .long_name
        .clone()
        .or_else(|| identity.short_name.clone())
        .filter(|n| !n.trim().is_empty());
    record.exchange = identity.exchange.clone();
    record.quote_type = identity.quote_type.as_ref().map(|t| t.to_uppercase());
    record.currency = identity.currency.clone();
}

/// Fill the fields derivable from what the record already has.
///
/// Only null fields are written, so running it again after a merge keeps the
/// merge idempotent.
pub fn fill_derived(record: &mut QuoteRecord) {
    if record.change_percent.is_none() {
        record.change_percent = derive_change_percent(record.price, record.previous_close);
    }
    if record.pe_ratio.is_none() {
        record.pe_ratio = derive_pe_ratio(record.price, record.eps);
    }
    if record.market_cap.is_none() {
        record.market_cap = derive_market_cap(record.price, record.shares_outstanding);
    }
}

fn stamp(record: &mut QuoteRecord, tier: FetchTier, market_time: Option<i64>) {
    record.as_of = market_time.and_then(|ts| Utc.timestamp_opt(ts, 0).single());
    if record.has_any_data() {
        record.sources.push(tier);
    }
}

/// Map one object of a bulk response.
pub fn map_bulk(symbol: &str, raw: &RawQuote) -> QuoteRecord {
    let mut record = QuoteRecord::new(symbol);
    apply_identity(&mut record, &raw.identity);

    record.price = dec(raw.price);
    record.previous_close = dec(raw.previous_close);
    record.change_percent = dec(raw.change_percent);
    record.volume = dec(raw.volume);
    record.average_volume = dec(raw.average_volume);
    record.market_cap = dec(raw.market_cap);
    record.shares_outstanding = dec(raw.shares_outstanding);
    record.week_52_high = dec(raw.week_52_high);
    record.week_52_low = dec(raw.week_52_low);
    record.pe_ratio = dec(raw.trailing_pe);
    record.eps = dec(raw.eps);
    record.dividend_yield = yield_percent(raw.dividend_yield);
    record.bid = dec(raw.bid);
    record.ask = dec(raw.ask);

    fill_derived(&mut record);
    stamp(&mut record, FetchTier::Bulk, raw.market_time);
    record
}

/// Map a per-symbol summary.
pub fn map_summary(symbol: &str, raw: &RawSummary) -> QuoteRecord {
    let mut record = QuoteRecord::new(symbol);
    apply_identity(&mut record, &raw.identity);

    record.price = dec(raw.price);
    record.previous_close = dec(raw.previous_close);
    record.volume = dec(raw.volume);
    record.average_volume = dec(raw.average_volume);
    record.market_cap = dec(raw.market_cap);
    record.shares_outstanding = dec(raw.shares_outstanding);
    record.week_52_high = dec(raw.week_52_high);
    record.week_52_low = dec(raw.week_52_low);
    record.pe_ratio = dec(raw.trailing_pe);
    record.eps = dec(raw.eps);
    record.dividend_yield = yield_percent(raw.dividend_yield);

    fill_derived(&mut record);
    stamp(&mut record, FetchTier::Summary, raw.market_time);
    record
}

/// Reconstruct price, volume and change from a daily series.
///
/// The latest bar with a close supplies price and volume; the close before it
/// (or the series' reported previous close) supplies the day change.
pub fn map_history(symbol: &str, raw: &RawHistory) -> QuoteRecord {
    let mut record = QuoteRecord::new(symbol);
    apply_identity(&mut record, &raw.identity);

    let mut closed = raw.bars.iter().filter(|b| b.close.is_some()).rev();
    let latest = closed.next();
    let prior = closed.next();

    if let Some(bar) = latest {
        record.price = dec(bar.close);
        record.volume = dec(bar.volume);
        record.previous_close = match prior {
            Some(prev) => dec(prev.close),
            None => dec(raw.previous_close),
        };
    }

    fill_derived(&mut record);
    stamp(&mut record, FetchTier::History, latest.map(|b| b.timestamp));
    record
}

/// Map any payload.
pub fn map_payload(symbol: &str, payload: &ProviderPayload) -> QuoteRecord {
    match payload {
        ProviderPayload::Bulk(raw) => map_bulk(symbol, raw),
        ProviderPayload::Summary(raw) => map_summary(symbol, raw),
        ProviderPayload::History(raw) => map_history(symbol, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RawBar;
    use rust_decimal_macros::dec;

    fn identity(symbol: &str, quote_type: &str) -> RawIdentity {
        RawIdentity {
            symbol: symbol.to_string(),
            quote_type: Some(quote_type.to_string()),
            long_name: Some(format!("{} Corp", symbol)),
            ..Default::default()
        }
    }

    #[test]
    fn test_map_bulk_direct_fields() {
        let raw = RawQuote {
            identity: identity("AAA", "equity"),
            price: Some(10.0),
            volume: Some(5000.0),
            market_cap: Some(1_000_000.0),
            change_percent: Some(2.5),
            market_time: Some(1_717_000_000),
            ..Default::default()
        };
        let record = map_bulk("AAA", &raw);

        assert_eq!(record.price, Some(dec!(10)));
        assert_eq!(record.volume, Some(dec!(5000)));
        assert_eq!(record.change_percent, Some(dec!(2.5)));
        assert_eq!(record.quote_type.as_deref(), Some("EQUITY"));
        assert_eq!(record.name.as_deref(), Some("AAA Corp"));
        assert_eq!(record.sources, vec![FetchTier::Bulk]);
        assert!(record.as_of.is_some());
        assert!(record.is_complete());
    }

    #[test]
    fn test_map_bulk_derives_missing_fields() {
        let raw = RawQuote {
            identity: identity("BBB", "EQUITY"),
            price: Some(12.5),
            previous_close: Some(10.0),
            eps: Some(2.5),
            shares_outstanding: Some(1000.0),
            ..Default::default()
        };
        let record = map_bulk("BBB", &raw);

        assert_eq!(record.change_percent, Some(dec!(25)));
        assert_eq!(record.pe_ratio, Some(dec!(5)));
        assert_eq!(record.market_cap, Some(dec!(12500)));
    }

    #[test]
    fn test_negative_eps_has_no_pe() {
        assert_eq!(derive_pe_ratio(Some(dec!(10)), Some(dec!(-1))), None);
        assert_eq!(derive_change_percent(Some(dec!(10)), Some(Decimal::ZERO)), None);
    }

    #[test]
    fn test_dividend_yield_rescaled() {
        let raw = RawQuote {
            identity: identity("KO", "EQUITY"),
            dividend_yield: Some(YieldValue::Fraction(0.0125)),
            ..Default::default()
        };
        assert_eq!(map_bulk("KO", &raw).dividend_yield, Some(dec!(1.25)));

        let raw = RawQuote {
            identity: identity("KO", "EQUITY"),
            dividend_yield: Some(YieldValue::Percent(3.1)),
            ..Default::default()
        };
        assert_eq!(map_bulk("KO", &raw).dividend_yield, Some(dec!(3.1)));
    }

    #[test]
    fn test_non_finite_values_become_null() {
        let raw = RawQuote {
            identity: identity("X", "EQUITY"),
            price: Some(f64::NAN),
            volume: Some(f64::INFINITY),
            ..Default::default()
        };
        let record = map_bulk("X", &raw);
        assert_eq!(record.price, None);
        assert_eq!(record.volume, None);
        assert!(record.sources.is_empty());
    }

    #[test]
    fn test_map_summary() {
        let raw = RawSummary {
            identity: identity("BBB", "EQUITY"),
            market_cap: Some(1_000_000.0),
            shares_outstanding: Some(80_000.0),
            week_52_high: Some(20.0),
            week_52_low: Some(8.0),
            ..Default::default()
        };
        let record = map_summary("BBB", &raw);
        assert_eq!(record.market_cap, Some(dec!(1000000)));
        assert_eq!(record.week_52_low, Some(dec!(8)));
        assert_eq!(record.sources, vec![FetchTier::Summary]);
    }

    #[test]
    fn test_map_history_uses_latest_bar() {
        let raw = RawHistory {
            identity: identity("CCC", "EQUITY"),
            bars: vec![
                RawBar { timestamp: 1, close: Some(8.0), volume: Some(100.0) },
                RawBar { timestamp: 2, close: Some(10.0), volume: Some(300.0) },
                RawBar { timestamp: 3, close: Some(12.0), volume: Some(400.0) },
                RawBar { timestamp: 4, close: None, volume: Some(50.0) },
            ],
            previous_close: Some(7.0),
        };
        let record = map_history("CCC", &raw);

        assert_eq!(record.price, Some(dec!(12)));
        assert_eq!(record.volume, Some(dec!(400)));
        assert_eq!(record.previous_close, Some(dec!(10)));
        assert_eq!(record.change_percent, Some(dec!(20)));
        assert_eq!(record.sources, vec![FetchTier::History]);
    }

    #[test]
    fn test_map_history_single_bar_uses_reported_previous_close() {
        let raw = RawHistory {
            identity: identity("CCC", "EQUITY"),
            bars: vec![RawBar { timestamp: 1, close: Some(11.0), volume: None }],
            previous_close: Some(10.0),
        };
        let record = map_history("CCC", &raw);
        assert_eq!(record.change_percent, Some(dec!(10)));
        assert_eq!(record.volume, None);
    }

    #[test]
    fn test_map_payload_dispatches_by_tier() {
        let payloads = [
            ProviderPayload::Bulk(RawQuote {
                identity: identity("AAA", "EQUITY"),
                price: Some(1.0),
                ..Default::default()
            }),
            ProviderPayload::Summary(RawSummary {
                identity: identity("AAA", "EQUITY"),
                market_cap: Some(2.0),
                ..Default::default()
            }),
            ProviderPayload::History(RawHistory {
                identity: identity("AAA", "EQUITY"),
                bars: vec![RawBar { timestamp: 1, close: Some(3.0), volume: Some(4.0) }],
                previous_close: None,
            }),
        ];

        for payload in &payloads {
            assert_eq!(payload.identity().symbol, "AAA");
            let record = map_payload("AAA", payload);
            assert_eq!(record.sources, vec![payload.tier()]);
        }
        assert_eq!(map_payload("AAA", &payloads[1]).market_cap, Some(dec!(2)));
        assert_eq!(map_payload("AAA", &payloads[2]).volume, Some(dec!(4)));
    }

    #[test]
    fn test_map_history_empty() {
        let record = map_history("CCC", &RawHistory::default());
        assert!(!record.has_any_data());
        assert!(record.sources.is_empty());
    }
}
