//! Provider-neutral raw payloads.
//!
//! Upstream implementations decode their wire format into these shapes;
//! every field is optional and unit conventions are made explicit so the
//! mapping into [`QuoteRecord`](crate::models::QuoteRecord) stays total.

use crate::models::FetchTier;

/// Dividend yield as the upstream expressed it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum YieldValue {
    /// Already in percent (1.25 means 1.25%).
    Percent(f64),
    /// A fraction (0.0125 means 1.25%).
    Fraction(f64),
}

impl YieldValue {
    pub fn as_percent(&self) -> f64 {
        match self {
            Self::Percent(p) => *p,
            Self::Fraction(f) => f * 100.0,
        }
    }
}

/// Identity fields shared by every payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawIdentity {
    pub symbol: String,
    pub quote_type: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
}

/// One object of a multi-symbol quote response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawQuote {
    pub identity: RawIdentity,
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    /// Day change in percent.
    pub change_percent: Option<f64>,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<YieldValue>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Unix seconds of the last trade.
    pub market_time: Option<i64>,
}

/// Per-symbol lightweight summary.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawSummary {
    pub identity: RawIdentity,
    pub price: Option<f64>,
    pub previous_close: Option<f64>,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<YieldValue>,
    pub market_time: Option<i64>,
}

/// One daily bar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawBar {
    /// Unix seconds at the bar's open.
    pub timestamp: i64,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A short daily series, oldest bar first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawHistory {
    pub identity: RawIdentity,
    pub bars: Vec<RawBar>,
    /// Close before the first bar, when the upstream reports it.
    pub previous_close: Option<f64>,
}

/// A raw payload from any tier.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderPayload {
    Bulk(RawQuote),
    Summary(RawSummary),
    History(RawHistory),
}

impl ProviderPayload {
    pub fn tier(&self) -> FetchTier {
        match self {
            Self::Bulk(_) => FetchTier::Bulk,
            Self::Summary(_) => FetchTier::Summary,
            Self::History(_) => FetchTier::History,
        }
    }

    pub fn identity(&self) -> &RawIdentity {
        match self {
            Self::Bulk(q) => &q.identity,
            Self::Summary(s) => &s.identity,
            Self::History(h) => &h.identity,
        }
    }
}
