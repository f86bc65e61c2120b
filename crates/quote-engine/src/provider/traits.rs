//! Upstream quote source trait.

use async_trait::async_trait;

use crate::errors::QuoteFetchError;
use crate::session::{FetchSession, SessionAuth};

use super::payload::{RawHistory, RawQuote, RawSummary};

/// Trait for the upstream the engine acquires quotes from.
///
/// Each method maps to one fetch tier. Implementations must surface
/// throttling and authentication failures as
/// [`QuoteFetchError::RateLimited`] / [`QuoteFetchError::AuthRejected`] so the
/// scheduler can rotate identities, and explicit "no such instrument" answers
/// as [`QuoteFetchError::SymbolNotFound`].
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quotescan_engine::provider::{QuoteUpstream, RawQuote, RawSummary, RawHistory};
///
/// struct MyUpstream;
///
/// #[async_trait]
/// impl QuoteUpstream for MyUpstream {
///     fn id(&self) -> &'static str {
///         "MY_UPSTREAM"
///     }
///
///     // ... implement the three tiers
/// }
/// ```
#[async_trait]
pub trait QuoteUpstream: Send + Sync {
    /// Constant identifier like "YAHOO", used in logs.
    fn id(&self) -> &'static str;

    /// Establish authentication artifacts for a fresh session.
    ///
    /// Upstreams without session auth keep the default.
    async fn warm_up(
        &self,
        _session: &FetchSession,
    ) -> Result<Option<SessionAuth>, QuoteFetchError> {
        Ok(None)
    }

    /// Tier 1: one request for every symbol of a chunk.
    ///
    /// Symbols the upstream does not know are simply absent from the result.
    async fn bulk_quotes(
        &self,
        session: &FetchSession,
        symbols: &[String],
    ) -> Result<Vec<RawQuote>, QuoteFetchError>;

    /// Tier 2: lightweight per-symbol metadata.
    async fn symbol_summary(
        &self,
        session: &FetchSession,
        symbol: &str,
    ) -> Result<RawSummary, QuoteFetchError>;

    /// Tier 3: the last `days` daily bars.
    async fn daily_history(
        &self,
        session: &FetchSession,
        symbol: &str,
        days: u32,
    ) -> Result<RawHistory, QuoteFetchError>;
}
