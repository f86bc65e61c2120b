//! Symbol-universe collaborator.

use async_trait::async_trait;

use crate::errors::QuoteFetchError;

/// Provides the tickers to scan.
///
/// Implementations may return raw tickers; the engine normalizes,
/// deduplicates and pattern-filters them.
#[async_trait]
pub trait SymbolUniverse: Send + Sync {
    async fn list_symbols(&self) -> Result<Vec<String>, QuoteFetchError>;
}

/// A fixed list of tickers.
#[derive(Clone, Debug, Default)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl SymbolUniverse for StaticUniverse {
    async fn list_symbols(&self) -> Result<Vec<String>, QuoteFetchError> {
        Ok(self.symbols.clone())
    }
}
