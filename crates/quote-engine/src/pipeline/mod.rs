//! Tiered fetch pipeline.
//!
//! For one chunk and one session, tiers run in increasing cost order against
//! the shared [`QuoteBook`]:
//!
//! ```text
//! pending ──► Tier 1 bulk ──► not complete ──► Tier 2 summary ──► price/volume missing ──► Tier 3 history
//! ```
//!
//! Symbols already settled in the book (complete, filtered out, not found)
//! are skipped, so a retried chunk never repeats finished work.
//!
//! Error handling per [`RetryClass`]:
//! - `Transient`: retried in-tier a few times, then the tier is skipped for
//!   that symbol, which then cannot be quarantined this pass
//! - `Terminal`: the symbol is done; "not found" marks it for the denylist
//! - `RotateIdentity` / `Never`: the attempt aborts and the scheduler decides
//!
//! A pass in which no upstream call produced an answer fails with the last
//! transient error, so the identity is penalized and the chunk retried.

mod book;
pub mod mapping;

pub use book::{BookResult, QuoteBook};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Sleeper, SystemClock};
use crate::config::EngineConfig;
use crate::errors::{QuoteFetchError, RetryClass};
use crate::models::FetchTier;
use crate::provider::{ProviderPayload, QuoteUpstream};
use crate::quality::RecordValidator;
use crate::scheduler::RunDeadline;
use crate::session::FetchSession;

/// Extra in-tier attempts on a transient error.
const TRANSIENT_RETRIES: u32 = 2;

/// Pause between in-tier attempts.
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// What one pipeline pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierReport {
    /// Upstream requests issued, retries included.
    pub requests: usize,
    /// Upstream calls that returned data or a definite "no data".
    pub answered: usize,
    pub bulk_returned: usize,
    pub summary_calls: usize,
    pub history_calls: usize,
    pub not_found: usize,
    pub non_equity: usize,
    /// Tier calls given up after in-tier retries.
    pub transient_failures: usize,
    /// Latency of the first answered request.
    pub response_time: Option<Duration>,
    /// The run deadline stopped the pass early.
    pub cancelled: bool,
}

/// Bookkeeping for one pass.
#[derive(Default)]
struct Pass {
    report: TierReport,
    /// Symbols with a tier call abandoned on a transient error.
    gaps: HashSet<String>,
    last_transient: Option<QuoteFetchError>,
}

/// Runs the three fetch tiers for a chunk.
pub struct TieredFetchPipeline {
    upstream: Arc<dyn QuoteUpstream>,
    config: EngineConfig,
    validator: RecordValidator,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl TieredFetchPipeline {
    pub fn new(
        upstream: Arc<dyn QuoteUpstream>,
        config: EngineConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            upstream,
            config,
            validator: RecordValidator::new(),
            clock: Arc::new(SystemClock),
            sleeper,
        }
    }

    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run every tier for `symbols` through `session`, merging into `book`.
    ///
    /// Returns `Err` when the attempt must be abandoned: a rate-limit or
    /// auth-block signature, or a pass where every upstream call failed
    /// transiently. An expired deadline ends the pass early with
    /// [`TierReport::cancelled`] set. Everything merged before that point
    /// stays in the book.
    pub async fn run(
        &self,
        session: &FetchSession,
        symbols: &[String],
        book: &QuoteBook,
        deadline: &RunDeadline,
    ) -> Result<TierReport, QuoteFetchError> {
        let mut pass = Pass::default();

        let pending: Vec<String> = symbols
            .iter()
            .filter(|s| !book.is_settled(s))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(pass.report);
        }

        match self.run_tiers(session, &pending, book, deadline, &mut pass).await {
            Ok(()) => {}
            Err(QuoteFetchError::Cancelled) => {
                debug!(
                    "Pipeline via {} stopped at the deadline: {:?}",
                    session.identity_label(),
                    pass.report
                );
                pass.report.cancelled = true;
                return Ok(pass.report);
            }
            Err(e) => return Err(e),
        }

        if pass.report.answered == 0 {
            if let Some(e) = pass.last_transient.take() {
                return Err(e);
            }
        }

        let mut finished = 0;
        for symbol in pending.iter().filter(|s| !pass.gaps.contains(*s)) {
            book.mark_finished(symbol);
            finished += 1;
        }

        debug!(
            "Pipeline via {} finished {}/{} symbols: {:?}",
            session.identity_label(),
            finished,
            pending.len(),
            pass.report
        );
        Ok(pass.report)
    }

    async fn run_tiers(
        &self,
        session: &FetchSession,
        pending: &[String],
        book: &QuoteBook,
        deadline: &RunDeadline,
        pass: &mut Pass,
    ) -> Result<(), QuoteFetchError> {
        self.bulk_tier(session, pending, book, deadline, pass).await?;
        self.summary_tier(session, pending, book, deadline, pass)
            .await?;
        self.history_tier(session, pending, book, deadline, pass)
            .await
    }

    async fn bulk_tier(
        &self,
        session: &FetchSession,
        pending: &[String],
        book: &QuoteBook,
        deadline: &RunDeadline,
        pass: &mut Pass,
    ) -> Result<(), QuoteFetchError> {
        deadline.check()?;

        let result = self
            .with_transient_retry(deadline, pass, || {
                self.upstream.bulk_quotes(session, pending)
            })
            .await;

        let quotes = match result {
            Ok(quotes) => {
                pass.report.answered += 1;
                quotes
            }
            Err(e) => return self.absorb(pending, FetchTier::Bulk, e, book, pass),
        };

        let wanted: HashSet<&str> = pending.iter().map(String::as_str).collect();
        for raw in quotes {
            let payload = ProviderPayload::Bulk(raw);
            let symbol = payload.identity().symbol.trim().to_uppercase();
            if !wanted.contains(symbol.as_str()) {
                debug!("Ignoring unrequested bulk quote for '{}'", symbol);
                continue;
            }
            pass.report.bulk_returned += 1;
            self.accept(&symbol, payload, book, pass);
        }
        Ok(())
    }

    async fn summary_tier(
        &self,
        session: &FetchSession,
        pending: &[String],
        book: &QuoteBook,
        deadline: &RunDeadline,
        pass: &mut Pass,
    ) -> Result<(), QuoteFetchError> {
        for symbol in pending {
            if book.is_settled(symbol) {
                continue;
            }
            deadline.check()?;

            pass.report.summary_calls += 1;
            let result = self
                .with_transient_retry(deadline, pass, || {
                    self.upstream.symbol_summary(session, symbol)
                })
                .await;

            match result {
                Ok(raw) => {
                    pass.report.answered += 1;
                    self.accept(symbol, ProviderPayload::Summary(raw), book, pass);
                }
                Err(e) => self.absorb(
                    std::slice::from_ref(symbol),
                    FetchTier::Summary,
                    e,
                    book,
                    pass,
                )?,
            }
        }
        Ok(())
    }

    async fn history_tier(
        &self,
        session: &FetchSession,
        pending: &[String],
        book: &QuoteBook,
        deadline: &RunDeadline,
        pass: &mut Pass,
    ) -> Result<(), QuoteFetchError> {
        let days = self.config.history_days;
        for symbol in pending {
            if book.is_settled(symbol) || !book.needs_price_or_volume(symbol) {
                continue;
            }
            deadline.check()?;

            pass.report.history_calls += 1;
            let result = self
                .with_transient_retry(deadline, pass, || {
                    self.upstream.daily_history(session, symbol, days)
                })
                .await;

            match result {
                Ok(raw) => {
                    pass.report.answered += 1;
                    self.accept(symbol, ProviderPayload::History(raw), book, pass);
                }
                Err(e) => self.absorb(
                    std::slice::from_ref(symbol),
                    FetchTier::History,
                    e,
                    book,
                    pass,
                )?,
            }
        }
        Ok(())
    }

    /// Map, sanitize, filter by quote type, and merge.
    fn accept(&self, symbol: &str, payload: ProviderPayload, book: &QuoteBook, pass: &mut Pass) {
        let mut record = mapping::map_payload(symbol, &payload);
        self.validator.sanitize(&mut record);
        if !self.config.allows_quote_type(record.quote_type.as_deref()) {
            debug!("{} tier returned non-equity {}", payload.tier(), symbol);
            pass.report.non_equity += 1;
            book.mark_non_equity(&record.symbol, record.quote_type.as_deref());
            return;
        }
        book.merge(record);
    }

    /// Recover a tier error locally, or hand it back to abort the attempt.
    fn absorb(
        &self,
        symbols: &[String],
        tier: FetchTier,
        error: QuoteFetchError,
        book: &QuoteBook,
        pass: &mut Pass,
    ) -> Result<(), QuoteFetchError> {
        match error.retry_class() {
            RetryClass::RotateIdentity | RetryClass::Never => Err(error),
            RetryClass::Terminal => {
                pass.report.answered += 1;
                if let (FetchTier::Summary | FetchTier::History, QuoteFetchError::SymbolNotFound(_)) =
                    (tier, &error)
                {
                    for symbol in symbols {
                        pass.report.not_found += 1;
                        book.mark_not_found(symbol);
                    }
                }
                debug!("{} tier for {:?}: {}", tier, symbols, error);
                Ok(())
            }
            RetryClass::Transient => {
                pass.report.transient_failures += 1;
                pass.gaps.extend(symbols.iter().cloned());
                debug!(
                    "{} tier for {} symbols gave up after retries: {}",
                    tier,
                    symbols.len(),
                    error
                );
                pass.last_transient = Some(error);
                Ok(())
            }
        }
    }

    /// Retry `op` on transient errors, sleeping between attempts.
    ///
    /// The first request that returns anything but a transient error sets
    /// the pass's response time.
    async fn with_transient_retry<T, F, Fut>(
        &self,
        deadline: &RunDeadline,
        pass: &mut Pass,
        mut op: F,
    ) -> Result<T, QuoteFetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QuoteFetchError>>,
    {
        let mut retries = 0;
        loop {
            pass.report.requests += 1;
            let started = self.clock.now();
            let result = op().await;
            let transient = matches!(&result, Err(e) if e.retry_class() == RetryClass::Transient);
            if !transient && pass.report.response_time.is_none() {
                pass.report.response_time =
                    Some(self.clock.now().saturating_duration_since(started));
            }

            match result {
                Err(e) if transient && retries < TRANSIENT_RETRIES && !deadline.is_expired() => {
                    retries += 1;
                    debug!("Transient error, retry {}/{}: {}", retries, TRANSIENT_RETRIES, e);
                    self.sleeper
                        .sleep(deadline.cap(TRANSIENT_RETRY_DELAY))
                        .await;
                }
                other => return other,
            }
        }
    }
}
