//! Yahoo Finance API response models.
//!
//! Numeric fields go through [`lenient_f64`]: Yahoo returns plain numbers on
//! the quote endpoint, `{"raw": n, "fmt": "..."}` objects (or `{}`) on
//! quoteSummary, and occasionally numeric strings. Anything else decodes to
//! `None` instead of failing the whole payload.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::provider::{RawBar, RawHistory, RawIdentity, RawQuote, RawSummary, YieldValue};

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        Value::Object(map) => map.get("raw").and_then(value_to_f64),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Decode a number, numeric string or `{"raw": n}` object; `None` otherwise.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

/// Same as [`lenient_f64`], truncated to whole seconds.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?.map(|f| f as i64))
}

/// Error object shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct YahooError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl YahooError {
    pub fn is_not_found(&self) -> bool {
        self.code.eq_ignore_ascii_case("Not Found")
            || self.description.to_ascii_lowercase().contains("not found")
            || self.description.to_ascii_lowercase().contains("delisted")
    }
}

// ============================================================================
// v7 quote
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteResponse {
    pub quote_response: YahooQuoteEnvelope,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteEnvelope {
    #[serde(default)]
    pub result: Option<Vec<YahooQuote>>,
    #[serde(default)]
    pub error: Option<YahooError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooQuote {
    pub symbol: String,
    pub quote_type: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub full_exchange_name: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_price: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_previous_close: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_change_percent: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_volume: Option<f64>,
    #[serde(rename = "averageDailyVolume3Month", deserialize_with = "lenient_f64")]
    pub average_daily_volume_3_month: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub shares_outstanding: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fifty_two_week_low: Option<f64>,
    #[serde(rename = "trailingPE", deserialize_with = "lenient_f64")]
    pub trailing_pe: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub eps_trailing_twelve_months: Option<f64>,
    /// Percent on this endpoint.
    #[serde(deserialize_with = "lenient_f64")]
    pub dividend_yield: Option<f64>,
    /// Fraction on this endpoint.
    #[serde(deserialize_with = "lenient_f64")]
    pub trailing_annual_dividend_yield: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub bid: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub ask: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub regular_market_time: Option<i64>,
}

impl From<YahooQuote> for RawQuote {
    fn from(q: YahooQuote) -> Self {
        let dividend_yield = q
            .dividend_yield
            .map(YieldValue::Percent)
            .or(q.trailing_annual_dividend_yield.map(YieldValue::Fraction));
        RawQuote {
            identity: RawIdentity {
                symbol: q.symbol,
                quote_type: q.quote_type,
                long_name: q.long_name,
                short_name: q.short_name,
                exchange: q.full_exchange_name.or(q.exchange),
                currency: q.currency,
            },
            price: q.regular_market_price,
            previous_close: q.regular_market_previous_close,
            change_percent: q.regular_market_change_percent,
            volume: q.regular_market_volume,
            average_volume: q.average_daily_volume_3_month,
            market_cap: q.market_cap,
            shares_outstanding: q.shares_outstanding,
            week_52_high: q.fifty_two_week_high,
            week_52_low: q.fifty_two_week_low,
            trailing_pe: q.trailing_pe,
            eps: q.eps_trailing_twelve_months,
            dividend_yield,
            bid: q.bid,
            ask: q.ask,
            market_time: q.regular_market_time,
        }
    }
}

// ============================================================================
// v10 quoteSummary
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResponse {
    pub quote_summary: YahooQuoteSummary,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteSummary {
    #[serde(default)]
    pub result: Option<Vec<YahooQuoteSummaryResult>>,
    #[serde(default)]
    pub error: Option<YahooError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooQuoteSummaryResult {
    pub price: Option<YahooPriceModule>,
    pub summary_detail: Option<YahooSummaryDetail>,
    pub default_key_statistics: Option<YahooKeyStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooPriceModule {
    pub symbol: Option<String>,
    pub quote_type: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub exchange_name: Option<String>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_price: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_previous_close: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub regular_market_volume: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooSummaryDetail {
    #[serde(deserialize_with = "lenient_f64")]
    pub previous_close: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub average_volume: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub fifty_two_week_low: Option<f64>,
    #[serde(rename = "trailingPE", deserialize_with = "lenient_f64")]
    pub trailing_pe: Option<f64>,
    /// Fraction on this endpoint.
    #[serde(deserialize_with = "lenient_f64")]
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooKeyStatistics {
    #[serde(deserialize_with = "lenient_f64")]
    pub shares_outstanding: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub trailing_eps: Option<f64>,
}

impl YahooQuoteSummaryResult {
    pub fn into_raw(self, symbol: &str) -> RawSummary {
        let price = self.price.unwrap_or_default();
        let detail = self.summary_detail.unwrap_or_default();
        let stats = self.default_key_statistics.unwrap_or_default();

        RawSummary {
            identity: RawIdentity {
                symbol: price.symbol.unwrap_or_else(|| symbol.to_string()),
                quote_type: price.quote_type,
                long_name: price.long_name,
                short_name: price.short_name,
                exchange: price.exchange_name,
                currency: price.currency,
            },
            price: price.regular_market_price,
            previous_close: price
                .regular_market_previous_close
                .or(detail.previous_close),
            volume: price.regular_market_volume.or(detail.volume),
            average_volume: detail.average_volume,
            market_cap: price.market_cap.or(detail.market_cap),
            shares_outstanding: stats.shares_outstanding,
            week_52_high: detail.fifty_two_week_high,
            week_52_low: detail.fifty_two_week_low,
            trailing_pe: detail.trailing_pe,
            eps: stats.trailing_eps,
            dividend_yield: detail.dividend_yield.map(YieldValue::Fraction),
            market_time: price.regular_market_time,
        }
    }
}

// ============================================================================
// v8 chart
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    #[serde(default)]
    pub result: Option<Vec<YahooChartData>>,
    #[serde(default)]
    pub error: Option<YahooError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct YahooChartData {
    pub meta: YahooChartMeta,
    pub timestamp: Option<Vec<i64>>,
    pub indicators: YahooIndicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YahooChartMeta {
    pub symbol: Option<String>,
    pub currency: Option<String>,
    pub full_exchange_name: Option<String>,
    pub exchange_name: Option<String>,
    pub instrument_type: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub chart_previous_close: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct YahooIndicators {
    pub quote: Vec<YahooBarSeries>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct YahooBarSeries {
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
}

impl YahooChartData {
    pub fn into_raw(self, symbol: &str) -> RawHistory {
        let series = self.indicators.quote.into_iter().next().unwrap_or_default();
        let bars = self
            .timestamp
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| RawBar {
                timestamp,
                close: series.close.get(i).copied().flatten(),
                volume: series.volume.get(i).copied().flatten(),
            })
            // Holidays come back as all-null bars
            .filter(|bar| bar.close.is_some() || bar.volume.is_some())
            .collect();

        RawHistory {
            identity: RawIdentity {
                symbol: self.meta.symbol.unwrap_or_else(|| symbol.to_string()),
                quote_type: self.meta.instrument_type,
                long_name: self.meta.long_name,
                short_name: self.meta.short_name,
                exchange: self.meta.full_exchange_name.or(self.meta.exchange_name),
                currency: self.meta.currency,
            },
            bars,
            previous_close: self.meta.chart_previous_close,
        }
    }
}
