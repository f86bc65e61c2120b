//! Shared fixtures: an in-process upstream and an engine wired to a manual clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quotescan_engine::provider::{RawBar, RawHistory, RawIdentity, RawQuote, RawSummary};
use quotescan_engine::{
    BatchQuoteEngine, EngineConfig, FetchSession, InstantSleeper, ManualClock, QuoteFetchError,
    QuoteUpstream, StaticUniverse,
};

pub fn identity(symbol: &str) -> RawIdentity {
    RawIdentity {
        symbol: symbol.to_string(),
        quote_type: Some("EQUITY".to_string()),
        long_name: Some(format!("{} Corp", symbol)),
        exchange: Some("NMS".to_string()),
        currency: Some("USD".to_string()),
        ..Default::default()
    }
}

pub fn complete_quote(symbol: &str) -> RawQuote {
    RawQuote {
        identity: identity(symbol),
        price: Some(25.5),
        previous_close: Some(25.0),
        volume: Some(120_000.0),
        average_volume: Some(100_000.0),
        market_cap: Some(2.5e9),
        week_52_high: Some(30.0),
        week_52_low: Some(18.0),
        trailing_pe: Some(17.0),
        eps: Some(1.5),
        ..Default::default()
    }
}

/// Upstream answering from fixed tables. Bulk calls can be scripted to fail
/// a number of times before answering, and identities can be made
/// unreachable.
#[derive(Default)]
pub struct MockUpstream {
    pub bulk: HashMap<String, RawQuote>,
    pub summaries: HashMap<String, RawSummary>,
    pub histories: HashMap<String, RawHistory>,
    pub bulk_rate_limits: AtomicUsize,
    pub bulk_timeouts: AtomicUsize,
    /// Identity labels whose every call times out.
    pub unreachable: Vec<String>,
    /// Every call moves this clock forward by the given latency.
    pub latency: Mutex<Option<(Arc<ManualClock>, Duration)>>,
    pub bulk_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub bulk_identities: Mutex<Vec<String>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complete(mut self, symbols: &[&str]) -> Self {
        for symbol in symbols {
            self.bulk.insert(symbol.to_string(), complete_quote(symbol));
        }
        self
    }

    pub fn with_bulk(mut self, quote: RawQuote) -> Self {
        self.bulk.insert(quote.identity.symbol.clone(), quote);
        self
    }

    pub fn with_summary(mut self, summary: RawSummary) -> Self {
        self.summaries.insert(summary.identity.symbol.clone(), summary);
        self
    }

    pub fn with_history(mut self, history: RawHistory) -> Self {
        self.histories.insert(history.identity.symbol.clone(), history);
        self
    }

    /// The next `count` bulk calls are throttled.
    pub fn rate_limit_bulk(self, count: usize) -> Self {
        self.bulk_rate_limits.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` bulk calls time out.
    pub fn time_out_bulk(self, count: usize) -> Self {
        self.bulk_timeouts.store(count, Ordering::SeqCst);
        self
    }

    pub fn unreachable_via(mut self, identities: &[&str]) -> Self {
        self.unreachable = identities.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn set_latency(&self, clock: Arc<ManualClock>, latency: Duration) {
        *self.latency.lock().unwrap() = Some((clock, latency));
    }

    /// Apply latency, then time out when the identity is unreachable.
    fn connect(&self, session: &FetchSession) -> Result<(), QuoteFetchError> {
        if let Some((clock, latency)) = self.latency.lock().unwrap().as_ref() {
            clock.advance(*latency);
        }
        let label = session.identity_label();
        if self.unreachable.contains(&label) {
            return Err(QuoteFetchError::Timeout { identity: label });
        }
        Ok(())
    }

    pub fn bulk_identities(&self) -> Vec<String> {
        self.bulk_identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteUpstream for MockUpstream {
    fn id(&self) -> &'static str {
        "MOCK"
    }

    async fn bulk_quotes(
        &self,
        session: &FetchSession,
        symbols: &[String],
    ) -> Result<Vec<RawQuote>, QuoteFetchError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.bulk_identities
            .lock()
            .unwrap()
            .push(session.identity_label());
        self.connect(session)?;

        let timed_out = self
            .bulk_timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if timed_out {
            return Err(QuoteFetchError::Timeout {
                identity: session.identity_label(),
            });
        }

        let throttled = self
            .bulk_rate_limits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(QuoteFetchError::RateLimited {
                identity: session.identity_label(),
                signature: "HTTP 429".to_string(),
            });
        }

        Ok(symbols
            .iter()
            .filter_map(|s| self.bulk.get(s).cloned())
            .collect())
    }

    async fn symbol_summary(
        &self,
        session: &FetchSession,
        symbol: &str,
    ) -> Result<RawSummary, QuoteFetchError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.connect(session)?;
        self.summaries
            .get(symbol)
            .cloned()
            .ok_or_else(|| QuoteFetchError::NoData(symbol.to_string()))
    }

    async fn daily_history(
        &self,
        session: &FetchSession,
        symbol: &str,
        _days: u32,
    ) -> Result<RawHistory, QuoteFetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.connect(session)?;
        self.histories
            .get(symbol)
            .cloned()
            .ok_or_else(|| QuoteFetchError::NoData(symbol.to_string()))
    }
}

pub fn bars(symbol: &str, closes: &[(f64, f64)]) -> RawHistory {
    RawHistory {
        identity: identity(symbol),
        bars: closes
            .iter()
            .enumerate()
            .map(|(i, (close, volume))| RawBar {
                timestamp: 1_700_000_000 + i as i64 * 86_400,
                close: Some(*close),
                volume: Some(*volume),
            })
            .collect(),
        previous_close: None,
    }
}

/// An engine over `symbols` with a manual clock and an instant sleeper.
pub fn engine(
    upstream: Arc<MockUpstream>,
    symbols: &[&str],
    config: EngineConfig,
) -> (BatchQuoteEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let sleeper = Arc::new(InstantSleeper::advancing(clock.clone()));
    let engine = BatchQuoteEngine::new(
        config,
        upstream,
        Arc::new(StaticUniverse::new(symbols.iter().copied())),
    )
    .with_clock(clock.clone())
    .with_sleeper(sleeper);
    (engine, clock)
}
