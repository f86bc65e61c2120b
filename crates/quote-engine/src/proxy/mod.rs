//! Proxy pool: candidate loading, address normalization and health tracking.

mod address;
mod registry;

pub use address::{normalize_candidates, normalize_proxy_address};
pub use registry::{ProxyHealthConfig, ProxyHealthRegistry, ProxyMetrics};

use async_trait::async_trait;

use crate::errors::QuoteFetchError;

/// Source of candidate proxy addresses.
#[async_trait]
pub trait ProxySupply: Send + Sync {
    /// Raw candidates. Normalization and deduplication happen in the engine.
    async fn load_candidates(&self) -> Result<Vec<String>, QuoteFetchError>;
}

/// A fixed list of candidates.
#[derive(Clone, Debug, Default)]
pub struct StaticProxySupply {
    candidates: Vec<String>,
}

impl StaticProxySupply {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ProxySupply for StaticProxySupply {
    async fn load_candidates(&self) -> Result<Vec<String>, QuoteFetchError> {
        Ok(self.candidates.clone())
    }
}
