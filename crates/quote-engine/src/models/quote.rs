use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fetch tier that contributed data to a record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    /// Multi-symbol quote call.
    Bulk,
    /// Per-symbol lightweight summary call.
    Summary,
    /// Daily-bar reconstruction.
    History,
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bulk => write!(f, "bulk"),
            Self::Summary => write!(f, "summary"),
            Self::History => write!(f, "history"),
        }
    }
}

/// Numeric fields tracked by the quality evaluator.
///
/// Bid/ask are not part of this set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreField {
    Price,
    ChangePercent,
    Volume,
    AverageVolume,
    MarketCap,
    Week52High,
    Week52Low,
    PeRatio,
    Eps,
    DividendYield,
}

impl CoreField {
    pub const ALL: [CoreField; 10] = [
        CoreField::Price,
        CoreField::ChangePercent,
        CoreField::Volume,
        CoreField::AverageVolume,
        CoreField::MarketCap,
        CoreField::Week52High,
        CoreField::Week52Low,
        CoreField::PeRatio,
        CoreField::Eps,
        CoreField::DividendYield,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::ChangePercent => "change_percent",
            Self::Volume => "volume",
            Self::AverageVolume => "average_volume",
            Self::MarketCap => "market_cap",
            Self::Week52High => "week_52_high",
            Self::Week52Low => "week_52_low",
            Self::PeRatio => "pe_ratio",
            Self::Eps => "eps",
            Self::DividendYield => "dividend_yield",
        }
    }

    /// Read this field from a record.
    pub fn value(&self, record: &QuoteRecord) -> Option<Decimal> {
        match self {
            Self::Price => record.price,
            Self::ChangePercent => record.change_percent,
            Self::Volume => record.volume,
            Self::AverageVolume => record.average_volume,
            Self::MarketCap => record.market_cap,
            Self::Week52High => record.week_52_high,
            Self::Week52Low => record.week_52_low,
            Self::PeRatio => record.pe_ratio,
            Self::Eps => record.eps,
            Self::DividendYield => record.dividend_yield,
        }
    }
}

impl fmt::Display for CoreField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized per-symbol quote.
///
/// Every field is independently nullable. A record is complete when price,
/// volume and market cap are all present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    pub price: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    /// Day-over-day change, in percent.
    pub change_percent: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub average_volume: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub shares_outstanding: Option<Decimal>,
    pub week_52_high: Option<Decimal>,
    pub week_52_low: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
    pub eps: Option<Decimal>,
    /// Dividend yield, in percent.
    pub dividend_yield: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,

    /// Tiers that supplied at least one field, in the order they did.
    #[serde(default)]
    pub sources: Vec<FetchTier>,

    /// Live volume was missing and average volume stands in for it.
    #[serde(default)]
    pub volume_substituted: bool,
}

impl QuoteRecord {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Price, volume and market cap are all present.
    pub fn is_complete(&self) -> bool {
        self.price.is_some() && self.volume.is_some() && self.market_cap.is_some()
    }

    /// Price or volume still missing; the history tier can supply both.
    pub fn needs_price_or_volume(&self) -> bool {
        self.price.is_none() || self.volume.is_none()
    }

    /// At least one numeric field carries a value.
    pub fn has_any_data(&self) -> bool {
        [
            self.price,
            self.previous_close,
            self.change_percent,
            self.volume,
            self.average_volume,
            self.market_cap,
            self.shares_outstanding,
            self.week_52_high,
            self.week_52_low,
            self.pe_ratio,
            self.eps,
            self.dividend_yield,
            self.bid,
            self.ask,
        ]
        .iter()
        .any(Option::is_some)
    }

    /// Fill every null field from `other`, never replacing a present value.
    ///
    /// `merge(r, x)` leaves every populated field of `r` untouched, so merging
    /// the same tier result twice is a no-op.
    pub fn merge(&mut self, other: QuoteRecord) {
        macro_rules! fill {
            ($($field:ident),+ $(,)?) => {
                $(
                    if self.$field.is_none() {
                        self.$field = other.$field;
                    }
                )+
            };
        }

        let took_volume = self.volume.is_none() && other.volume.is_some();

        fill!(
            name,
            exchange,
            quote_type,
            currency,
            price,
            previous_close,
            change_percent,
            volume,
            average_volume,
            market_cap,
            shares_outstanding,
            week_52_high,
            week_52_low,
            pe_ratio,
            eps,
            dividend_yield,
            bid,
            ask,
            as_of,
        );

        if took_volume {
            self.volume_substituted = other.volume_substituted;
        }

        for tier in other.sources {
            if !self.sources.contains(&tier) {
                self.sources.push(tier);
            }
        }
    }

    /// Builder-style merge.
    pub fn merged(mut self, other: QuoteRecord) -> Self {
        self.merge(other);
        self
    }
}
